//! # Record Sources
//!
//! A source is one dataset's backend: something that can produce a typed
//! record stream for a time window. Backends differ wildly (pre-formatted
//! daily files, spawned readers, remote servers), so the engine talks to
//! them through a small capability trait and adapts around what each one
//! can do:
//!
//! | Capability | When absent |
//! |------------|-------------|
//! | `has_granules` | the source serves the whole window in one call |
//! | `has_field_projection` | the engine projects with a [`crate::records::SubsetCursor`] |
//!
//! - [`granule`]: calendar decomposition of a window into granules
//! - [`aggregation`]: the cursor that splices per-granule streams
//! - [`file`]: daily/hourly pre-formatted CSV files
//! - [`spawn`]: records read from a spawned subprocess
//! - [`remote`]: records proxied from another server speaking the same protocol
//!
//! The [`SourceRegistry`] maps dataset ids to live backends and is the only
//! shared mutable state in this module.

pub mod aggregation;
pub mod file;
pub mod granule;
pub mod remote;
pub mod spawn;

use std::sync::Arc;

use eyre::{bail, eyre, Result};
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::records::{DatumBuf, RecordCursor};
use crate::schema::{FieldType, Schema};
use crate::time::{TimeComponents, TimeRange};

pub use aggregation::AggregatingCursor;
pub use file::DailyFileSource;
pub use granule::calendar_granules;
pub use remote::RemoteSource;
pub use spawn::SpawnSource;

/// Capability interface for one dataset backend.
pub trait RecordSource: Send + Sync {
    /// True when the window decomposes into granules served separately.
    fn has_granules(&self) -> bool;

    /// The granules intersecting `window`, in ascending order. Only called
    /// when [`RecordSource::has_granules`] is true.
    fn granules(&self, window: &TimeRange) -> Result<Vec<TimeRange>>;

    /// True when the backend can serve only the requested fields itself.
    fn has_field_projection(&self) -> bool;

    /// Open a record stream for `window`. `fields` is Some only when
    /// [`RecordSource::has_field_projection`] is true.
    fn records(
        &self,
        window: &TimeRange,
        fields: Option<&[String]>,
    ) -> Result<Box<dyn RecordCursor + '_>>;

    /// Most recent modification time of the backing data for `window`,
    /// None when unknown.
    fn last_modified(&self, window: &TimeRange) -> Option<TimeComponents>;
}

/// Dataset id to backend mapping, shared across requests.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Arc<dyn RecordSource>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<String>, source: Arc<dyn RecordSource>) {
        self.sources.write().insert(id.into(), source);
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<dyn RecordSource>> {
        self.sources
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| eyre!("no source registered for dataset {:?}", id))
    }
}

/// Parse one pre-formatted CSV line into typed field values against the
/// schema. Array fields consume one column per element; quoted columns keep
/// embedded commas.
pub(crate) fn parse_record_line(schema: &Schema, line: &str) -> Result<Vec<DatumBuf>> {
    let columns = split_csv(line);
    let mut row = Vec::with_capacity(schema.field_count());
    let mut col = 0;
    for field in schema.fields() {
        let take = |col: &mut usize| -> Result<&str> {
            let c = columns
                .get(*col)
                .ok_or_else(|| eyre!("line has {} columns, field {:?} needs more", columns.len(), field.name))?;
            *col += 1;
            Ok(c.as_str())
        };
        let datum = match (field.ftype, field.is_array()) {
            (FieldType::Isotime, _) => DatumBuf::Isotime(take(&mut col)?.to_string()),
            (FieldType::String, _) => DatumBuf::Str(take(&mut col)?.to_string()),
            (FieldType::Double, false) => DatumBuf::Double(parse_num(take(&mut col)?, field)?),
            (FieldType::Integer, false) => DatumBuf::Integer(parse_int(take(&mut col)?, field)?),
            (FieldType::Double, true) => {
                let mut v = Vec::with_capacity(field.element_count());
                for _ in 0..field.element_count() {
                    v.push(parse_num(take(&mut col)?, field)?);
                }
                DatumBuf::DoubleArray(v)
            }
            (FieldType::Integer, true) => {
                let mut v = Vec::with_capacity(field.element_count());
                for _ in 0..field.element_count() {
                    v.push(parse_int(take(&mut col)?, field)?);
                }
                DatumBuf::IntegerArray(v)
            }
        };
        row.push(datum);
    }
    if col != columns.len() {
        bail!(
            "line has {} columns, schema consumes {}",
            columns.len(),
            col
        );
    }
    Ok(row)
}

fn parse_num(s: &str, field: &crate::schema::FieldDef) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| eyre!("cannot parse {:?} as double for field {:?}", s, field.name))
}

fn parse_int(s: &str, field: &crate::schema::FieldDef) -> Result<i32> {
    s.trim()
        .parse::<i32>()
        .map_err(|_| eyre!("cannot parse {:?} as integer for field {:?}", s, field.name))
}

/// Split a CSV line on commas, honoring double quotes with "" escapes.
fn split_csv(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cur.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' => quoted = true,
            ',' if !quoted => out.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    out.push(cur);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;
    use std::sync::Arc;

    fn schema() -> Schema {
        Schema::new(
            vec![
                FieldDef::new("Time", FieldType::Isotime).with_length(24),
                FieldDef::new("density", FieldType::Double).with_fill("-1e31"),
                FieldDef::new("bgse", FieldType::Double)
                    .with_fill("-1e31")
                    .with_size(&[3]),
                FieldDef::new("flag", FieldType::Integer),
            ],
            TimeComponents::new(2020, 1, 1, 0, 0, 0),
            TimeComponents::new(2024, 1, 1, 0, 0, 0),
        )
        .unwrap()
    }

    #[test]
    fn parses_scalar_and_array_columns() {
        let row = parse_record_line(
            &schema(),
            "2023-04-26T00:00:00.000Z,5.5,1.0,2.0,3.0,0",
        )
        .unwrap();
        assert_eq!(row[1], DatumBuf::Double(5.5));
        assert_eq!(row[2], DatumBuf::DoubleArray(vec![1.0, 2.0, 3.0]));
        assert_eq!(row[3], DatumBuf::Integer(0));
    }

    #[test]
    fn rejects_short_and_long_lines() {
        assert!(parse_record_line(&schema(), "2023-04-26T00:00:00.000Z,5.5").is_err());
        assert!(parse_record_line(
            &schema(),
            "2023-04-26T00:00:00.000Z,5.5,1.0,2.0,3.0,0,extra"
        )
        .is_err());
    }

    #[test]
    fn quoted_column_keeps_comma() {
        let cols = split_csv(r#"a,"b,c",d"#);
        assert_eq!(cols, vec!["a", "b,c", "d"]);
        let cols = split_csv(r#""say ""hi""",x"#);
        assert_eq!(cols, vec![r#"say "hi""#, "x"]);
    }

    #[test]
    fn registry_lookup_names_missing_dataset() {
        let reg = SourceRegistry::new();
        let err = reg.lookup("ac_h0_mfi").err().unwrap();
        assert!(err.to_string().contains("ac_h0_mfi"));
    }

    #[test]
    fn registry_round_trip() {
        struct Dummy;
        impl RecordSource for Dummy {
            fn has_granules(&self) -> bool {
                false
            }
            fn granules(&self, _: &TimeRange) -> Result<Vec<TimeRange>> {
                Ok(Vec::new())
            }
            fn has_field_projection(&self) -> bool {
                false
            }
            fn records(
                &self,
                _: &TimeRange,
                _: Option<&[String]>,
            ) -> Result<Box<dyn RecordCursor + '_>> {
                Ok(Box::new(crate::records::BufferedCursor::new(Vec::new())))
            }
            fn last_modified(&self, _: &TimeRange) -> Option<TimeComponents> {
                None
            }
        }
        let reg = SourceRegistry::new();
        reg.register("d", Arc::new(Dummy));
        assert!(!reg.lookup("d").unwrap().has_granules());
    }
}
