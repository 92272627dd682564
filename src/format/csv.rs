//! Comma-separated text encoding.
//!
//! One line per record, one column per element. Times are reformatted to
//! the declared field length, strings are double-quoted with `""` escapes,
//! doubles substitute the canonical fill literal on exact match. No header
//! line: the schema travels separately.

use std::io::Write;

use eyre::{bail, ensure, Result};

use crate::records::{Datum, Record};
use crate::schema::{FieldType, Schema};
use crate::time::reformat_isotime;

use super::{DataFormatter, FormatterPlan};

#[derive(Default)]
pub struct CsvFormatter {
    plan: Option<FormatterPlan>,
    line: String,
}

impl CsvFormatter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataFormatter for CsvFormatter {
    fn initialize(
        &mut self,
        schema: &Schema,
        first: &mut dyn Record,
        _out: &mut dyn Write,
    ) -> Result<()> {
        self.plan = Some(FormatterPlan::build(schema, first)?);
        Ok(())
    }

    fn send_record(&mut self, record: &mut dyn Record, out: &mut dyn Write) -> Result<()> {
        let plan = match &self.plan {
            Some(p) => p,
            None => bail!("formatter used before initialize"),
        };
        self.line.clear();
        for (i, field) in plan.fields.iter().enumerate() {
            if i > 0 {
                self.line.push(',');
            }
            match (field.ftype, record.field(i)?) {
                (FieldType::Isotime, Datum::Isotime(s)) => {
                    let len = field.length.unwrap_or(s.len());
                    self.line.push_str(&reformat_isotime(len, s)?);
                }
                (FieldType::String, Datum::Str(s)) => {
                    self.line.push('"');
                    for c in s.chars() {
                        if c == '"' {
                            self.line.push('"');
                        }
                        self.line.push(c);
                    }
                    self.line.push('"');
                }
                (FieldType::Double, Datum::Double(v)) => field.render_double(v, &mut self.line),
                (FieldType::Double, Datum::DoubleArray(vs)) => {
                    ensure!(
                        vs.len() == field.element_count,
                        "field {:?} carries {} elements, plan expects {}",
                        field.name,
                        vs.len(),
                        field.element_count
                    );
                    for (j, v) in vs.iter().enumerate() {
                        if j > 0 {
                            self.line.push(',');
                        }
                        field.render_double(*v, &mut self.line);
                    }
                }
                (FieldType::Integer, Datum::Integer(v)) => {
                    self.line.push_str(&v.to_string());
                }
                (FieldType::Integer, Datum::IntegerArray(vs)) => {
                    ensure!(
                        vs.len() == field.element_count,
                        "field {:?} carries {} elements, plan expects {}",
                        field.name,
                        vs.len(),
                        field.element_count
                    );
                    for (j, v) in vs.iter().enumerate() {
                        if j > 0 {
                            self.line.push(',');
                        }
                        self.line.push_str(&v.to_string());
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
        self.line.push('\n');
        out.write_all(self.line.as_bytes())?;
        Ok(())
    }
}
