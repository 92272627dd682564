//! Column projection by field-index remapping.
//!
//! When a source cannot project fields itself, the engine wraps its cursor
//! so position `i` of the projected record reads position `map[i]` of the
//! underlying record. The map is built once per request from the schema.

use eyre::{ensure, Result};

use super::{Datum, Record, RecordCursor};

pub struct SubsetCursor<C> {
    inner: C,
    map: Vec<usize>,
}

impl<C: RecordCursor> SubsetCursor<C> {
    pub fn new(inner: C, map: Vec<usize>) -> Self {
        Self { inner, map }
    }
}

impl<C: RecordCursor> Record for SubsetCursor<C> {
    fn field_count(&self) -> usize {
        self.map.len()
    }

    fn field(&mut self, i: usize) -> Result<Datum<'_>> {
        ensure!(i < self.map.len(), "field index {} out of projection", i);
        self.inner.field(self.map[i])
    }
}

impl<C: RecordCursor> RecordCursor for SubsetCursor<C> {
    fn advance(&mut self) -> Result<bool> {
        self.inner.advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{BufferedCursor, DatumBuf};

    fn three_field_cursor() -> BufferedCursor {
        BufferedCursor::new(vec![vec![
            DatumBuf::Isotime("2023-04-26T00:00:00.000Z".into()),
            DatumBuf::Double(1.5),
            DatumBuf::Integer(7),
        ]])
    }

    #[test]
    fn remaps_positions() {
        let mut c = SubsetCursor::new(three_field_cursor(), vec![0, 2]);
        assert!(c.advance().unwrap());
        assert_eq!(c.field_count(), 2);
        assert_eq!(c.field(1).unwrap().as_integer().unwrap(), 7);
    }

    #[test]
    fn out_of_projection_index_is_an_error() {
        let mut c = SubsetCursor::new(three_field_cursor(), vec![0, 2]);
        assert!(c.advance().unwrap());
        assert!(c.field(2).is_err());
    }
}
