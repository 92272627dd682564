//! # Request Driver
//!
//! Wires one request into a pull chain and drains it into a sink:
//!
//! ```text
//!   source ─► aggregation ─► projection ─► clip ─► formatter ─► sink
//!             (if granular)  (if needed)
//! ```
//!
//! Capability negotiation happens here: a granular source is wrapped in
//! the aggregating cursor; projection is forwarded to the source when it
//! projects fields itself and applied with a [`SubsetCursor`] otherwise.
//! The formatter is initialized lazily from the first record, so an empty
//! window writes nothing. A sink failure propagates immediately and the
//! whole chain is dropped, releasing file handles and child processes.

use std::io::Write;

use eyre::{ensure, Result, WrapErr};

use crate::format::DataFormatter;
use crate::records::{ClipCursor, RecordCursor, SubsetCursor};
use crate::schema::Schema;
use crate::source::{AggregatingCursor, RecordSource};
use crate::time::TimeRange;

/// Stream all records of `window` for one dataset. Returns the number of
/// records sent; zero means nothing was written to the sink.
pub fn stream_records(
    source: &dyn RecordSource,
    dataset: &str,
    schema: &Schema,
    window: &TimeRange,
    projection: Option<&[String]>,
    formatter: &mut dyn DataFormatter,
    sink: &mut dyn Write,
) -> Result<u64> {
    ensure!(
        !window.is_empty(),
        "window {} is empty or inverted",
        window
    );

    let (out_schema, map) = match projection {
        Some(names) => {
            let map = schema.projection(names)?;
            (schema.subset(&map)?, Some(map))
        }
        None => (schema.clone(), None),
    };

    // forward the field list only when the source projects itself
    let source_fields = if source.has_field_projection() {
        projection.map(|names| names.to_vec())
    } else {
        None
    };

    let base: Box<dyn RecordCursor + '_> = if source.has_granules() {
        Box::new(AggregatingCursor::new(
            source,
            dataset,
            *window,
            source_fields,
        )?)
    } else {
        source
            .records(window, source_fields.as_deref())
            .wrap_err_with(|| format!("opening dataset {:?}", dataset))?
    };

    let projected: Box<dyn RecordCursor + '_> = match map {
        Some(map) if !source.has_field_projection() => Box::new(SubsetCursor::new(base, map)),
        _ => base,
    };

    let mut cursor = ClipCursor::new(projected, *window);

    if !cursor.advance()? {
        tracing::debug!(dataset = %dataset, window = %window, "no records in window");
        return Ok(0);
    }
    formatter.initialize(&out_schema, &mut cursor, sink)?;
    formatter.send_record(&mut cursor, sink)?;
    let mut sent: u64 = 1;
    while cursor.advance()? {
        formatter.send_record(&mut cursor, sink)?;
        sent += 1;
    }
    formatter.finalize(sink)?;
    tracing::debug!(dataset = %dataset, records = sent, "stream complete");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CsvFormatter;
    use crate::records::{BufferedCursor, DatumBuf};
    use crate::schema::{FieldDef, FieldType};
    use crate::time::TimeComponents;
    use eyre::eyre;

    struct WholeWindowSource {
        rows: Vec<(String, f64, i32)>,
    }

    impl RecordSource for WholeWindowSource {
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
            Ok(Box::new(BufferedCursor::new(
                self.rows
                    .iter()
                    .map(|(t, d, f)| {
                        vec![
                            DatumBuf::Isotime(t.clone()),
                            DatumBuf::Double(*d),
                            DatumBuf::Integer(*f),
                        ]
                    })
                    .collect(),
            )))
        }
        fn last_modified(&self, _: &TimeRange) -> Option<TimeComponents> {
            None
        }
    }

    fn schema() -> Schema {
        Schema::new(
            vec![
                FieldDef::new("Time", FieldType::Isotime).with_length(24),
                FieldDef::new("density", FieldType::Double).with_fill("-1e31"),
                FieldDef::new("flag", FieldType::Integer),
            ],
            TimeComponents::new(2020, 1, 1, 0, 0, 0),
            TimeComponents::new(2024, 1, 1, 0, 0, 0),
        )
        .unwrap()
    }

    fn source() -> WholeWindowSource {
        WholeWindowSource {
            rows: vec![
                ("2023-04-25T23:00:00.000Z".into(), 1.0, 0),
                ("2023-04-26T06:00:00.000Z".into(), 2.0, 1),
                ("2023-04-26T18:00:00.000Z".into(), 3.0, 0),
                ("2023-04-27T01:00:00.000Z".into(), 4.0, 1),
            ],
        }
    }

    fn window() -> TimeRange {
        TimeRange::parse("2023-04-26T00:00Z/2023-04-27T00:00Z").unwrap()
    }

    #[test]
    fn clips_to_window_and_counts_records() {
        let mut out = Vec::new();
        let mut fmt = CsvFormatter::new();
        let sent = stream_records(
            &source(),
            "ds",
            &schema(),
            &window(),
            None,
            &mut fmt,
            &mut out,
        )
        .unwrap();
        assert_eq!(sent, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "2023-04-26T06:00:00.000Z,2.0,1\n2023-04-26T18:00:00.000Z,3.0,0\n"
        );
    }

    #[test]
    fn projection_uses_subset_cursor() {
        let mut out = Vec::new();
        let mut fmt = CsvFormatter::new();
        let sent = stream_records(
            &source(),
            "ds",
            &schema(),
            &window(),
            Some(&["flag".to_string()]),
            &mut fmt,
            &mut out,
        )
        .unwrap();
        assert_eq!(sent, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "2023-04-26T06:00:00.000Z,1\n2023-04-26T18:00:00.000Z,0\n"
        );
    }

    #[test]
    fn empty_window_result_writes_nothing() {
        let mut out = Vec::new();
        let mut fmt = CsvFormatter::new();
        let w = TimeRange::parse("2023-05-01T00:00Z/2023-05-02T00:00Z").unwrap();
        let sent =
            stream_records(&source(), "ds", &schema(), &w, None, &mut fmt, &mut out).unwrap();
        assert_eq!(sent, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut out = Vec::new();
        let mut fmt = CsvFormatter::new();
        let w = TimeRange::parse("2023-04-27T00:00Z/2023-04-26T00:00Z").unwrap();
        assert!(
            stream_records(&source(), "ds", &schema(), &w, None, &mut fmt, &mut out).is_err()
        );
    }

    #[test]
    fn sink_failure_aborts_the_stream() {
        struct FailingSink {
            writes: usize,
        }
        impl Write for FailingSink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if self.writes == 0 {
                    self.writes += 1;
                    Ok(buf.len())
                } else {
                    Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
                }
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut sink = FailingSink { writes: 0 };
        let mut fmt = CsvFormatter::new();
        let err = stream_records(
            &source(),
            "ds",
            &schema(),
            &window(),
            None,
            &mut fmt,
            &mut sink,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("gone"));
    }

    #[test]
    fn unknown_projection_fails_before_output() {
        let mut out = Vec::new();
        let mut fmt = CsvFormatter::new();
        let err = stream_records(
            &source(),
            "ds",
            &schema(),
            &window(),
            Some(&["bogus".to_string()]),
            &mut fmt,
            &mut out,
        )
        .unwrap_err();
        assert!(err.to_string().contains("bogus"));
        assert!(out.is_empty());
    }

    #[test]
    fn source_open_failure_names_the_dataset() {
        struct Broken;
        impl RecordSource for Broken {
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
                Err(eyre!("backend offline"))
            }
            fn last_modified(&self, _: &TimeRange) -> Option<TimeComponents> {
                None
            }
        }
        let mut out = Vec::new();
        let mut fmt = CsvFormatter::new();
        let err = stream_records(
            &Broken,
            "ac_h0_mfi",
            &schema(),
            &window(),
            None,
            &mut fmt,
            &mut out,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("ac_h0_mfi"));
    }
}
