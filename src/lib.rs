//! # heliostream - Streaming Record Core for Heliophysics Time Series
//!
//! heliostream serves heliophysics time-series datasets through a uniform
//! streaming record interface over heterogeneous storage backends. This
//! implementation prioritizes:
//!
//! - **Constant memory per request**: one record in flight, reusable scratch
//! - **Zero-copy record access**: values lent from cursor-owned buffers
//! - **Uniform semantics**: three encoders agreeing byte for byte on types,
//!   fill, and field order
//!
//! ## Quick Start
//!
//! ```ignore
//! use heliostream::format::CsvFormatter;
//! use heliostream::source::DailyFileSource;
//! use heliostream::stream::stream_records;
//! use heliostream::time::TimeRange;
//!
//! let schema = catalog.schema("ac_h0_mfi")?;
//! let source = DailyFileSource::new("/data/ac_h0_mfi/$Y/$Y$m$d.csv", (*schema).clone())?;
//! let window = TimeRange::parse("2023-04-26T00:00Z/2023-04-28T00:00Z")?;
//!
//! let mut formatter = CsvFormatter::new();
//! let sent = stream_records(&source, "ac_h0_mfi", &schema, &window,
//!                           None, &mut formatter, &mut out)?;
//! ```
//!
//! ## Architecture
//!
//! One pull-based chain per request, no shared state on the hot path:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        Request Driver (stream)           │
//! ├──────────────────────────────────────────┤
//! │  Encoders: CSV / Binary / JSON (format)  │
//! ├──────────────────────────────────────────┤
//! │  Clip & Projection Cursors (records)     │
//! ├──────────────────────────────────────────┤
//! │  Granule Aggregation (source)            │
//! ├───────────────────┬──────────────────────┤
//! │  Field Adaptation │ Virtual Variables    │
//! │  (adapter)        │ (adapter::graph)     │
//! ├───────────────────┴──────────────────────┤
//! │  Backends: daily files, subprocesses     │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`time`]: decomposed calendar time, ranges, calendar stepping
//! - [`schema`]: dataset field descriptions, JSON info documents
//! - [`records`]: lending record cursors, projection, window clipping
//! - [`adapter`]: raw storage arrays, fill repair, virtual-variable DAG
//! - [`source`]: backend capability trait, granule aggregation, registry
//! - [`format`]: CSV, packed binary, and JSON encoders
//! - [`catalog`]: process-wide schema cache with mtime invalidation
//! - [`stream`]: the per-request driver
//! - [`config`]: centralized constants and tunables

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod format;
pub mod records;
pub mod schema;
pub mod source;
pub mod stream;
pub mod time;

pub use catalog::{Catalog, DirectoryCatalog};
pub use format::{BinaryFormatter, CsvFormatter, DataFormatter, JsonFormatter};
pub use records::{Datum, Record, RecordCursor};
pub use schema::{FieldDef, FieldType, Schema};
pub use source::{RecordSource, SourceRegistry};
pub use stream::stream_records;
pub use time::{TimeComponents, TimeRange};
