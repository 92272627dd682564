//! # Field Adaptation
//!
//! Between a granule's decoded storage arrays and the record stream sits the
//! adaptation layer. Each requested field becomes a node in a small DAG:
//! stored fields are leaves ([`raw::LeafAdapter`]), computed fields are
//! transform nodes over other fields' outputs. The whole graph is validated
//! at construction, then evaluated per record index with reused scratch
//! buffers.
//!
//! ```text
//!   RawArray ──► LeafAdapter ──┐
//!   RawArray ──► LeafAdapter ──┼──► transform nodes ──► Datum per record
//!                 (repairs)    ┘      (virtual fields)
//! ```
//!
//! - [`raw`]: storage encodings, fill canonicalization, length repair
//! - [`graph`]: the arena DAG of adapters and its evaluation protocol
//! - [`cursor`]: a [`crate::records::RecordCursor`] over an evaluated graph

pub mod cursor;
pub mod graph;
pub mod raw;

use crate::config::FUZZY_FILL_TOLERANCE;
use crate::schema::{FieldDef, FieldType};

pub use cursor::AdapterCursor;
pub use graph::{AdapterGraph, AdapterId, CompareOp};
pub use raw::{fuzzy_fill, LeafAdapter, RawArray};

/// The canonical value shape a field produces, the schema type refined by
/// whether the field is dimensioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Isotime,
    Str,
    Double,
    DoubleArray,
    Integer,
    IntegerArray,
}

impl ValueKind {
    pub fn of_field(field: &FieldDef) -> ValueKind {
        match (field.ftype, field.is_array()) {
            (FieldType::Isotime, _) => ValueKind::Isotime,
            (FieldType::String, _) => ValueKind::Str,
            (FieldType::Double, false) => ValueKind::Double,
            (FieldType::Double, true) => ValueKind::DoubleArray,
            (FieldType::Integer, false) => ValueKind::Integer,
            (FieldType::Integer, true) => ValueKind::IntegerArray,
        }
    }
}

/// Tunables for the adaptation layer.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Relative tolerance for fill canonicalization.
    pub fuzzy_fill_tolerance: f64,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            fuzzy_fill_tolerance: FUZZY_FILL_TOLERANCE,
        }
    }
}
