//! # Record Access
//!
//! This module defines the streaming record interface shared by every layer
//! of the engine: sources produce records, the aggregation and projection
//! cursors rearrange them, and the formatters consume them.
//!
//! ## Lending Access
//!
//! A record is an ordered tuple of typed field values with positional access
//! only. Values are borrowed from cursor-owned buffers through [`Datum`], and
//! a borrow is invalid past the next [`RecordCursor::advance`] call: the
//! backing storage may be reused for the next record. This is the same
//! zero-copy discipline as a storage-page view, applied to a forward-only
//! stream.
//!
//! ```text
//! loop {
//!     if !cursor.advance()? { break }
//!     for i in 0..cursor.field_count() {
//!         match cursor.field(i)? { ... }   // borrow ends before next advance
//!     }
//! }
//! ```
//!
//! ## Components
//!
//! - [`Datum`] / [`DatumBuf`]: borrowed and owned typed field values
//! - [`Record`] / [`RecordCursor`]: positional access + forward iteration
//! - [`BufferedCursor`]: in-memory cursor over parsed rows
//! - [`subset`]: field-index remapping for column projection
//! - [`clip`]: window restriction and time-order enforcement

pub mod clip;
pub mod subset;

use eyre::{bail, Result};

pub use clip::ClipCursor;
pub use subset::SubsetCursor;

/// A borrowed typed field value. The borrow is only valid until the owning
/// cursor advances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Datum<'a> {
    Isotime(&'a str),
    Str(&'a str),
    Double(f64),
    DoubleArray(&'a [f64]),
    Integer(i32),
    IntegerArray(&'a [i32]),
}

impl<'a> Datum<'a> {
    pub fn kind(&self) -> &'static str {
        match self {
            Datum::Isotime(_) => "isotime",
            Datum::Str(_) => "string",
            Datum::Double(_) => "double",
            Datum::DoubleArray(_) => "double array",
            Datum::Integer(_) => "integer",
            Datum::IntegerArray(_) => "integer array",
        }
    }

    pub fn as_isotime(&self) -> Result<&'a str> {
        match self {
            Datum::Isotime(s) => Ok(s),
            other => bail!("expected isotime, got {}", other.kind()),
        }
    }

    pub fn as_str(&self) -> Result<&'a str> {
        match self {
            Datum::Str(s) | Datum::Isotime(s) => Ok(s),
            other => bail!("expected string, got {}", other.kind()),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        match self {
            Datum::Double(d) => Ok(*d),
            Datum::Integer(i) => Ok(*i as f64),
            other => bail!("expected double, got {}", other.kind()),
        }
    }

    pub fn as_double_array(&self) -> Result<&'a [f64]> {
        match self {
            Datum::DoubleArray(d) => Ok(d),
            other => bail!("expected double array, got {}", other.kind()),
        }
    }

    pub fn as_integer(&self) -> Result<i32> {
        match self {
            Datum::Integer(i) => Ok(*i),
            other => bail!("expected integer, got {}", other.kind()),
        }
    }

    pub fn as_integer_array(&self) -> Result<&'a [i32]> {
        match self {
            Datum::IntegerArray(i) => Ok(i),
            other => bail!("expected integer array, got {}", other.kind()),
        }
    }
}

/// An owned typed field value, used by sources that parse records out of
/// text (files, subprocess output) into reusable row buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum DatumBuf {
    Isotime(String),
    Str(String),
    Double(f64),
    DoubleArray(Vec<f64>),
    Integer(i32),
    IntegerArray(Vec<i32>),
}

impl DatumBuf {
    pub fn as_datum(&self) -> Datum<'_> {
        match self {
            DatumBuf::Isotime(s) => Datum::Isotime(s),
            DatumBuf::Str(s) => Datum::Str(s),
            DatumBuf::Double(d) => Datum::Double(*d),
            DatumBuf::DoubleArray(d) => Datum::DoubleArray(d),
            DatumBuf::Integer(i) => Datum::Integer(*i),
            DatumBuf::IntegerArray(i) => Datum::IntegerArray(i),
        }
    }
}

/// Positional access to the current record's typed field values.
///
/// `field` takes `&mut self` so implementations may render into owned
/// scratch buffers; the returned borrow ends before the next call.
pub trait Record {
    fn field_count(&self) -> usize;
    fn field(&mut self, i: usize) -> Result<Datum<'_>>;
}

/// A forward-only stream of records. There is no separate record object:
/// the cursor *is* the current record once `advance` has returned true.
pub trait RecordCursor: Record {
    /// Move to the next record. Returns false when the stream is exhausted;
    /// after that the cursor holds no record.
    fn advance(&mut self) -> Result<bool>;
}

impl<R: Record + ?Sized> Record for Box<R> {
    fn field_count(&self) -> usize {
        (**self).field_count()
    }

    fn field(&mut self, i: usize) -> Result<Datum<'_>> {
        (**self).field(i)
    }
}

impl<R: RecordCursor + ?Sized> RecordCursor for Box<R> {
    fn advance(&mut self) -> Result<bool> {
        (**self).advance()
    }
}

/// An in-memory cursor over fully-parsed rows. Used by tests and by sources
/// that must materialize a granule before serving it.
pub struct BufferedCursor {
    rows: Vec<Vec<DatumBuf>>,
    pos: Option<usize>,
}

impl BufferedCursor {
    pub fn new(rows: Vec<Vec<DatumBuf>>) -> Self {
        Self { rows, pos: None }
    }
}

impl Record for BufferedCursor {
    fn field_count(&self) -> usize {
        self.pos
            .and_then(|p| self.rows.get(p))
            .map(|r| r.len())
            .unwrap_or(0)
    }

    fn field(&mut self, i: usize) -> Result<Datum<'_>> {
        let row = match self.pos.and_then(|p| self.rows.get(p)) {
            Some(row) => row,
            None => bail!("cursor is not positioned on a record"),
        };
        match row.get(i) {
            Some(d) => Ok(d.as_datum()),
            None => bail!(
                "field index {} out of range for a {}-field record",
                i,
                row.len()
            ),
        }
    }
}

impl RecordCursor for BufferedCursor {
    fn advance(&mut self) -> Result<bool> {
        let next = self.pos.map(|p| p + 1).unwrap_or(0);
        if next < self.rows.len() {
            self.pos = Some(next);
            Ok(true)
        } else {
            self.pos = Some(self.rows.len());
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_cursor_walks_rows_in_order() {
        let mut c = BufferedCursor::new(vec![
            vec![DatumBuf::Integer(1)],
            vec![DatumBuf::Integer(2)],
        ]);
        assert!(c.advance().unwrap());
        assert_eq!(c.field(0).unwrap().as_integer().unwrap(), 1);
        assert!(c.advance().unwrap());
        assert_eq!(c.field(0).unwrap().as_integer().unwrap(), 2);
        assert!(!c.advance().unwrap());
    }

    #[test]
    fn field_before_advance_is_an_error() {
        let mut c = BufferedCursor::new(vec![vec![DatumBuf::Integer(1)]]);
        assert!(c.field(0).is_err());
    }

    #[test]
    fn field_out_of_range_is_an_error() {
        let mut c = BufferedCursor::new(vec![vec![DatumBuf::Integer(1)]]);
        assert!(c.advance().unwrap());
        let err = c.field(3).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn field_after_exhaustion_is_an_error() {
        let mut c = BufferedCursor::new(vec![vec![DatumBuf::Integer(1)]]);
        assert!(c.advance().unwrap());
        assert!(!c.advance().unwrap());
        assert!(c.field(0).is_err());
    }

    #[test]
    fn datum_type_mismatch_reports_both_kinds() {
        let d = Datum::Double(3.5);
        let err = d.as_integer_array().unwrap_err();
        assert!(err.to_string().contains("double"));
        assert!(err.to_string().contains("integer array"));
    }

    #[test]
    fn integer_widens_to_double() {
        assert_eq!(Datum::Integer(7).as_double().unwrap(), 7.0);
    }
}
