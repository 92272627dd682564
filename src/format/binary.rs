//! Packed little-endian binary encoding.
//!
//! Fixed width per field: 8 bytes per double element, 4 per integer
//! element, and the declared `length` bytes for isotime/string fields
//! (UTF-8, zero padded, truncated at a character boundary when oversize).
//! Each record is assembled completely in a reusable buffer and written
//! with one `write_all`, so a sink failure never leaves a partial record.

use std::io::Write;

use eyre::{bail, ensure, Result};

use crate::config::{BINARY_DOUBLE_SIZE, BINARY_INTEGER_SIZE};
use crate::records::{Datum, Record};
use crate::schema::{FieldType, Schema};
use crate::time::reformat_isotime;

use super::{DataFormatter, FormatterPlan};

#[derive(Default)]
pub struct BinaryFormatter {
    plan: Option<FormatterPlan>,
    buf: Vec<u8>,
}

impl BinaryFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes one record occupies under the plan.
    pub fn record_size(plan: &FormatterPlan) -> usize {
        plan.fields
            .iter()
            .map(|f| match f.ftype {
                FieldType::Isotime | FieldType::String => f.length.unwrap_or(0),
                FieldType::Double => BINARY_DOUBLE_SIZE * f.element_count,
                FieldType::Integer => BINARY_INTEGER_SIZE * f.element_count,
            })
            .sum()
    }
}

/// Write `s` into exactly `len` bytes, zero padded, truncated at a char
/// boundary when oversize.
fn push_padded(buf: &mut Vec<u8>, s: &str, len: usize) {
    let bytes = s.as_bytes();
    if bytes.len() <= len {
        buf.extend_from_slice(bytes);
        buf.resize(buf.len() + (len - bytes.len()), 0);
    } else {
        let mut cut = len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        buf.extend_from_slice(&bytes[..cut]);
        buf.resize(buf.len() + (len - cut), 0);
    }
}

impl DataFormatter for BinaryFormatter {
    fn initialize(
        &mut self,
        schema: &Schema,
        first: &mut dyn Record,
        _out: &mut dyn Write,
    ) -> Result<()> {
        let plan = FormatterPlan::build(schema, first)?;
        for f in &plan.fields {
            if matches!(f.ftype, FieldType::Isotime | FieldType::String) {
                ensure!(
                    f.length.unwrap_or(0) > 0,
                    "field {:?} needs a declared length for binary encoding",
                    f.name
                );
            }
        }
        self.buf.reserve(Self::record_size(&plan));
        self.plan = Some(plan);
        Ok(())
    }

    fn send_record(&mut self, record: &mut dyn Record, out: &mut dyn Write) -> Result<()> {
        let plan = match &self.plan {
            Some(p) => p,
            None => bail!("formatter used before initialize"),
        };
        self.buf.clear();
        for (i, field) in plan.fields.iter().enumerate() {
            match (field.ftype, record.field(i)?) {
                (FieldType::Isotime, Datum::Isotime(s)) => {
                    let len = field.length.unwrap_or(0);
                    push_padded(&mut self.buf, &reformat_isotime(len, s)?, len);
                }
                (FieldType::String, Datum::Str(s)) => {
                    push_padded(&mut self.buf, s, field.length.unwrap_or(0));
                }
                (FieldType::Double, Datum::Double(v)) => {
                    self.buf.extend_from_slice(&v.to_le_bytes());
                }
                (FieldType::Double, Datum::DoubleArray(vs)) => {
                    ensure!(
                        vs.len() == field.element_count,
                        "field {:?} carries {} elements, plan expects {}",
                        field.name,
                        vs.len(),
                        field.element_count
                    );
                    for v in vs {
                        self.buf.extend_from_slice(&v.to_le_bytes());
                    }
                }
                (FieldType::Integer, Datum::Integer(v)) => {
                    self.buf.extend_from_slice(&v.to_le_bytes());
                }
                (FieldType::Integer, Datum::IntegerArray(vs)) => {
                    ensure!(
                        vs.len() == field.element_count,
                        "field {:?} carries {} elements, plan expects {}",
                        field.name,
                        vs.len(),
                        field.element_count
                    );
                    for v in vs {
                        self.buf.extend_from_slice(&v.to_le_bytes());
                    }
                }
                (ftype, datum) => bail!(
                    "field {:?} declares {} but the record carries {}",
                    field.name,
                    ftype.as_str(),
                    datum.kind()
                ),
            }
        }
        out.write_all(&self.buf)?;
        Ok(())
    }
}
