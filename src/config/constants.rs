//! # Heliostream Configuration Constants
//!
//! This module centralizes the thresholds used by the adaptation and
//! formatting layers. Constants that interact are co-located and their
//! relationships documented.
//!
//! ## Dependency Graph
//!
//! ```text
//! FUZZY_FILL_TOLERANCE (1e-6)
//!       │
//!       └─> Leaf adapters canonicalize any decoded float within this
//!           relative tolerance of the declared fill to the exact fill bit
//!           pattern. Formatters then compare with == and substitute the
//!           fill literal, so the tolerance must be applied before any
//!           value reaches a formatter.
//!
//! MAX_DIMENSIONS (4)
//!       │
//!       └─> Fill-array synthesis and the JSON nested-array renderer both
//!           recurse over the declared size list; MAX_DIMENSIONS bounds that
//!           recursion.
//!
//! BINARY_INTEGER_SIZE (4) / BINARY_DOUBLE_SIZE (8)
//!       │
//!       └─> Fixed per-element widths of the binary encoding. A reader
//!           holding only the schema computes absolute byte offsets from
//!           these, so they are part of the wire contract and must never
//!           change.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `FUZZY_FILL_TOLERANCE` is applied at decode time, never at format time.
//! 2. The binary element widths are wire-contract values.

/// Relative tolerance for fill canonicalization: a decoded floating value v
/// with |v/fill - 1| < tolerance is replaced by the exact fill value.
///
/// Decoded values round-trip through single precision and virtual-variable
/// arithmetic, producing many near-fill values that must format identically.
/// This threshold is empirically derived, not a protocol invariant; datasets
/// whose valid data approaches the fill sentinel should override it through
/// `AdapterOptions`.
pub const FUZZY_FILL_TOLERANCE: f64 = 1e-6;

/// Maximum number of declared dimensions for an array field.
pub const MAX_DIMENSIONS: usize = 4;

/// Bytes per element for integer fields in the binary encoding.
pub const BINARY_INTEGER_SIZE: usize = 4;

/// Bytes per element for double fields in the binary encoding.
pub const BINARY_DOUBLE_SIZE: usize = 8;

/// Full width of a canonical ISO 8601 time with nanosecond resolution,
/// "YYYY-MM-DDTHH:MM:SS.NNNNNNNNNZ".
pub const ISOTIME_FULL_LENGTH: usize = 30;

/// Shortest isotime length the formatters will emit, "YYYY-MM-DDTHH:MMZ".
pub const ISOTIME_MIN_LENGTH: usize = 17;

const _: () = assert!(
    ISOTIME_MIN_LENGTH <= ISOTIME_FULL_LENGTH,
    "isotime length bounds are inverted"
);
