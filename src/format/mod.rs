//! # Output Encoders
//!
//! Three encoders turn the record stream into response bytes: CSV, packed
//! binary, and JSON. All three follow the same lifecycle and must agree on
//! field order, type semantics, and fill rendering, so the shared part
//! lives here as a [`FormatterPlan`] built once per response:
//!
//! ```text
//!   initialize(schema, first record)  -> plan + header bytes
//!   send_record(record)               -> one encoded record
//!   finalize()                        -> trailer bytes (JSON only)
//! ```
//!
//! The plan captures per field: the output category, the declared byte
//! width for time/string fields, the canonical fill and its literal, and
//! the dimension sizes. The first record is validated while building the
//! plan, so malformed data fails before any response bytes are written.
//! After that a record whose shape disagrees with the plan is fatal for the
//! remainder of the response.

pub mod binary;
pub mod csv;
pub mod json;

use std::io::Write;

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::records::{Datum, Record};
use crate::schema::{FieldType, Schema};

pub use binary::BinaryFormatter;
pub use csv::CsvFormatter;
pub use json::JsonFormatter;

/// One encoder for one response. Implementations are stateful: `initialize`
/// must be called exactly once, before any `send_record`.
pub trait DataFormatter {
    fn initialize(
        &mut self,
        schema: &Schema,
        first: &mut dyn Record,
        out: &mut dyn Write,
    ) -> Result<()>;

    fn send_record(&mut self, record: &mut dyn Record, out: &mut dyn Write) -> Result<()>;

    /// Close the response. A no-op for encoders without a trailer.
    fn finalize(&mut self, out: &mut dyn Write) -> Result<()> {
        let _ = out;
        Ok(())
    }
}

/// Per-field encoding decisions, fixed for the whole response.
#[derive(Debug, Clone)]
pub struct FieldPlan {
    pub name: String,
    pub ftype: FieldType,
    /// Declared byte width, present for isotime/string fields.
    pub length: Option<usize>,
    /// Canonical fill literal from the schema, substituted on exact match.
    pub fill_literal: Option<String>,
    /// The literal parsed as a double, NaN when absent.
    pub fill: f64,
    pub dims: SmallVec<[usize; 2]>,
    pub element_count: usize,
}

#[derive(Debug, Clone)]
pub struct FormatterPlan {
    pub fields: Vec<FieldPlan>,
}

impl FormatterPlan {
    /// Derive the plan from the schema and validate it against the first
    /// record of the response.
    pub fn build(schema: &Schema, first: &mut dyn Record) -> Result<FormatterPlan> {
        ensure!(
            first.field_count() == schema.field_count(),
            "first record has {} fields, schema declares {}",
            first.field_count(),
            schema.field_count()
        );
        let mut fields = Vec::with_capacity(schema.field_count());
        for (i, f) in schema.fields().iter().enumerate() {
            let datum = first.field(i)?;
            match (f.ftype, &datum) {
                (FieldType::Isotime, Datum::Isotime(s)) => {
                    ensure!(
                        s.ends_with('Z'),
                        "time value {:?} for field {:?} does not end in Z",
                        s,
                        f.name
                    );
                }
                (FieldType::String, Datum::Str(s)) => {
                    let len = f.length.unwrap_or(0);
                    if s.len() > len {
                        tracing::warn!(
                            field = %f.name,
                            declared = len,
                            actual = s.len(),
                            "string value exceeds declared length"
                        );
                    }
                }
                (FieldType::Double, Datum::Double(_))
                | (FieldType::Double, Datum::DoubleArray(_))
                | (FieldType::Integer, Datum::Integer(_))
                | (FieldType::Integer, Datum::IntegerArray(_)) => {}
                (ftype, datum) => bail!(
                    "field {:?} declares {} but the record carries {}",
                    f.name,
                    ftype.as_str(),
                    datum.kind()
                ),
            }
            if let Datum::DoubleArray(v) = &datum {
                ensure!(
                    v.len() == f.element_count(),
                    "field {:?} carries {} elements, schema declares {}",
                    f.name,
                    v.len(),
                    f.element_count()
                );
            }
            fields.push(FieldPlan {
                name: f.name.clone(),
                ftype: f.ftype,
                length: f.length,
                fill_literal: f.fill.clone(),
                fill: f.fill_double(),
                dims: f.size.clone(),
                element_count: f.element_count(),
            });
        }
        Ok(FormatterPlan { fields })
    }
}

impl FieldPlan {
    /// Render a double as response text, substituting the canonical fill
    /// literal on exact match. Used identically by the CSV and JSON
    /// encoders so the two agree byte for byte.
    pub fn render_double(&self, v: f64, out: &mut String) {
        if v == self.fill {
            if let Some(lit) = &self.fill_literal {
                out.push_str(lit);
                return;
            }
        }
        if v.is_finite() {
            out.push_str(&format_double_short(v));
        } else if let Some(lit) = &self.fill_literal {
            out.push_str(lit);
        } else {
            out.push_str("null");
        }
    }
}

/// Shortest text form that parses back to the same double. `{}` on f64
/// already has this property.
fn format_double_short(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e16 {
        // keep integral doubles compact but unambiguous
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}
