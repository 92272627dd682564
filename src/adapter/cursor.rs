//! Record cursor over an evaluated adapter graph.
//!
//! One cursor serves one granule: `advance` steps the record index and
//! `field` lazily evaluates the root node for the requested position. Field
//! borrows come out of the graph's scratch buffers, so they end before the
//! next advance like every other cursor in the engine.

use eyre::{ensure, Result};

use crate::records::{Datum, Record, RecordCursor};

use super::graph::{AdapterGraph, AdapterId};

pub struct AdapterCursor {
    graph: AdapterGraph,
    roots: Vec<AdapterId>,
    /// None before the first advance, Some(record_count) after exhaustion.
    pos: Option<usize>,
}

impl AdapterCursor {
    pub fn new(graph: AdapterGraph, roots: Vec<AdapterId>) -> Self {
        Self {
            graph,
            roots,
            pos: None,
        }
    }
}

impl Record for AdapterCursor {
    fn field_count(&self) -> usize {
        self.roots.len()
    }

    fn field(&mut self, i: usize) -> Result<Datum<'_>> {
        ensure!(i < self.roots.len(), "field index {} out of range", i);
        let pos = match self.pos {
            Some(p) if p < self.graph.record_count() => p,
            _ => eyre::bail!("cursor is not positioned on a record"),
        };
        self.graph.eval(self.roots[i], pos)?;
        Ok(self.graph.datum(self.roots[i]))
    }
}

impl RecordCursor for AdapterCursor {
    fn advance(&mut self) -> Result<bool> {
        let next = self.pos.map(|p| p + 1).unwrap_or(0);
        if next < self.graph.record_count() {
            self.pos = Some(next);
            Ok(true)
        } else {
            self.pos = Some(self.graph.record_count());
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterOptions, RawArray};
    use crate::schema::{FieldDef, FieldType, Schema};
    use crate::time::TimeComponents;
    use hashbrown::HashMap;

    fn cursor() -> AdapterCursor {
        let schema = Schema::new(
            vec![
                FieldDef::new("Time", FieldType::Isotime).with_length(30),
                FieldDef::new("density", FieldType::Double).with_fill("-1e31"),
            ],
            TimeComponents::new(2020, 1, 1, 0, 0, 0),
            TimeComponents::new(2024, 1, 1, 0, 0, 0),
        )
        .unwrap();
        let mut data = HashMap::new();
        data.insert(
            "Time".to_string(),
            RawArray::Tt2000(vec![0, 1_000_000_000]),
        );
        data.insert("density".to_string(), RawArray::Double(vec![1.5, 2.5]));
        let (graph, roots) =
            AdapterGraph::build(&schema, data, 2, &[0, 1], &AdapterOptions::default()).unwrap();
        AdapterCursor::new(graph, roots)
    }

    #[test]
    fn walks_adapted_records() {
        let mut c = cursor();
        assert_eq!(c.field_count(), 2);
        assert!(c.advance().unwrap());
        assert_eq!(
            c.field(0).unwrap().as_isotime().unwrap(),
            "2000-01-01T11:58:55.816000000Z"
        );
        assert_eq!(c.field(1).unwrap().as_double().unwrap(), 1.5);
        assert!(c.advance().unwrap());
        assert_eq!(c.field(1).unwrap().as_double().unwrap(), 2.5);
        assert!(!c.advance().unwrap());
    }

    #[test]
    fn field_after_exhaustion_is_an_error() {
        let mut c = cursor();
        while c.advance().unwrap() {}
        assert!(c.field(0).is_err());
    }

    #[test]
    fn field_before_advance_is_an_error() {
        let mut c = cursor();
        assert!(c.field(0).is_err());
    }
}
