//! # Heliostream Configuration Module
//!
//! Centralizes the tunable constants for the record-streaming core. Several of
//! these values are empirically derived thresholds rather than protocol
//! invariants, so they live here where their relationships can be documented
//! and adjusted in one place.
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric configuration values with dependency documentation

pub mod constants;
pub use constants::*;
