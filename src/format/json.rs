//! JSON encoding: the info document with an embedded data array.
//!
//! The header is the serialized info document clipped before its closing
//! brace, reopened with a `"data"` array. Each record is one JSON array in
//! field order; dimensioned fields nest depth-first in row-major order, so
//! a `[2,3]` field becomes two inner arrays of three. `finalize` closes
//! the data array and the document.

use std::io::Write;

use eyre::{bail, ensure, Result};

use crate::records::{Datum, Record};
use crate::schema::{FieldType, Schema};
use crate::time::reformat_isotime;

use super::{DataFormatter, FieldPlan, FormatterPlan};

#[derive(Default)]
pub struct JsonFormatter {
    plan: Option<FormatterPlan>,
    line: String,
    records_sent: u64,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Nest a flat row-major slice into JSON arrays per the declared dims.
fn render_nested(field: &FieldPlan, dims: &[usize], flat: &[f64], out: &mut String) {
    match dims.split_first() {
        None | Some((_, [])) => {
            out.push('[');
            for (j, v) in flat.iter().enumerate() {
                if j > 0 {
                    out.push(',');
                }
                field.render_double(*v, out);
            }
            out.push(']');
        }
        Some((&outer, rest)) => {
            let chunk = flat.len() / outer;
            out.push('[');
            for i in 0..outer {
                if i > 0 {
                    out.push(',');
                }
                render_nested(field, rest, &flat[i * chunk..(i + 1) * chunk], out);
            }
            out.push(']');
        }
    }
}

fn push_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

impl DataFormatter for JsonFormatter {
    fn initialize(
        &mut self,
        schema: &Schema,
        first: &mut dyn Record,
        out: &mut dyn Write,
    ) -> Result<()> {
        self.plan = Some(FormatterPlan::build(schema, first)?);
        let doc = serde_json::to_string(&schema.to_document())?;
        let clipped = doc
            .strip_suffix('}')
            .ok_or_else(|| eyre::eyre!("info document did not serialize to an object"))?;
        out.write_all(clipped.as_bytes())?;
        out.write_all(b",\"data\":[\n")?;
        Ok(())
    }

    fn send_record(&mut self, record: &mut dyn Record, out: &mut dyn Write) -> Result<()> {
        let plan = match &self.plan {
            Some(p) => p,
            None => bail!("formatter used before initialize"),
        };
        self.line.clear();
        if self.records_sent > 0 {
            self.line.push_str(",\n");
        }
        self.line.push('[');
        for (i, field) in plan.fields.iter().enumerate() {
            if i > 0 {
                self.line.push(',');
            }
            match (field.ftype, record.field(i)?) {
                (FieldType::Isotime, Datum::Isotime(s)) => {
                    let len = field.length.unwrap_or(s.len());
                    push_json_string(&reformat_isotime(len, s)?, &mut self.line);
                }
                (FieldType::String, Datum::Str(s)) => push_json_string(s, &mut self.line),
                (FieldType::Double, Datum::Double(v)) => field.render_double(v, &mut self.line),
                (FieldType::Double, Datum::DoubleArray(vs)) => {
                    ensure!(
                        vs.len() == field.element_count,
                        "field {:?} carries {} elements, plan expects {}",
                        field.name,
                        vs.len(),
                        field.element_count
                    );
                    if field.dims.is_empty() {
                        // declared scalar carried as a one-element array
                        field.render_double(vs[0], &mut self.line);
                    } else {
                        render_nested(field, &field.dims, vs, &mut self.line);
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
                    self.line.push('[');
                    for (j, v) in vs.iter().enumerate() {
                        if j > 0 {
                            self.line.push(',');
                        }
                        self.line.push_str(&v.to_string());
                    }
                    self.line.push(']');
                }
                (ftype, datum) => bail!(
                    "field {:?} declares {} but the record carries {}",
                    field.name,
                    ftype.as_str(),
                    datum.kind()
                ),
            }
        }
        self.line.push(']');
        out.write_all(self.line.as_bytes())?;
        self.records_sent += 1;
        Ok(())
    }

    fn finalize(&mut self, out: &mut dyn Write) -> Result<()> {
        out.write_all(b"\n]}\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::{test_rows, test_schema};
    use crate::records::{BufferedCursor, DatumBuf, RecordCursor};
    use crate::schema::{FieldDef, Schema};
    use crate::time::TimeComponents;

    fn encode() -> String {
        let schema = test_schema();
        let mut c = BufferedCursor::new(test_rows());
        c.advance().unwrap();
        let mut out = Vec::new();
        let mut fmt = JsonFormatter::new();
        fmt.initialize(&schema, &mut c, &mut out).unwrap();
        fmt.send_record(&mut c, &mut out).unwrap();
        while c.advance().unwrap() {
            fmt.send_record(&mut c, &mut out).unwrap();
        }
        fmt.finalize(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn output_is_valid_json_with_info_and_data() {
        let text = encode();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["parameters"][0]["name"], "Time");
        let data = v["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0][0], "2023-04-26T00:00:00.000Z");
        assert_eq!(data[0][1], 5.5);
        assert_eq!(data[0][2][1], -2.5);
        assert_eq!(data[1][4], "survey");
    }

    #[test]
    fn fill_renders_as_the_literal_number() {
        let text = encode();
        // second record's density is fill
        assert!(text.contains("[\"2023-04-26T00:01:00.000Z\",-1e31,"));
    }

    #[test]
    fn two_dimensional_field_nests_row_major() {
        let schema = Schema::new(
            vec![
                FieldDef::new("Time", crate::schema::FieldType::Isotime).with_length(24),
                FieldDef::new("flux", crate::schema::FieldType::Double)
                    .with_fill("-1e31")
                    .with_size(&[2, 3]),
            ],
            TimeComponents::new(2020, 1, 1, 0, 0, 0),
            TimeComponents::new(2024, 1, 1, 0, 0, 0),
        )
        .unwrap();
        let mut c = BufferedCursor::new(vec![vec![
            DatumBuf::Isotime("2023-04-26T00:00:00.000Z".into()),
            DatumBuf::DoubleArray(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        ]]);
        c.advance().unwrap();
        let mut out = Vec::new();
        let mut fmt = JsonFormatter::new();
        fmt.initialize(&schema, &mut c, &mut out).unwrap();
        fmt.send_record(&mut c, &mut out).unwrap();
        fmt.finalize(&mut out).unwrap();
        let v: serde_json::Value = serde_json::from_str(&String::from_utf8(out).unwrap()).unwrap();
        assert_eq!(v["data"][0][1][0][2], 3.0);
        assert_eq!(v["data"][0][1][1][0], 4.0);
    }

    #[test]
    fn declared_scalar_carried_as_one_element_array_renders_bare() {
        let schema = Schema::new(
            vec![
                FieldDef::new("Time", crate::schema::FieldType::Isotime).with_length(24),
                FieldDef::new("bz", crate::schema::FieldType::Double).with_fill("-1e31"),
            ],
            TimeComponents::new(2020, 1, 1, 0, 0, 0),
            TimeComponents::new(2024, 1, 1, 0, 0, 0),
        )
        .unwrap();
        let rows = vec![vec![
            DatumBuf::Isotime("2023-04-26T00:00:00.000Z".into()),
            DatumBuf::DoubleArray(vec![3.0]),
        ]];
        let mut c = BufferedCursor::new(rows.clone());
        c.advance().unwrap();
        let mut out = Vec::new();
        let mut fmt = JsonFormatter::new();
        fmt.initialize(&schema, &mut c, &mut out).unwrap();
        fmt.send_record(&mut c, &mut out).unwrap();
        fmt.finalize(&mut out).unwrap();
        let v: serde_json::Value = serde_json::from_str(&String::from_utf8(out).unwrap()).unwrap();
        assert!(v["data"][0][1].is_number());
        assert_eq!(v["data"][0][1], 3.0);

        // and the CSV encoder agrees on the rendered text
        let mut c = BufferedCursor::new(rows);
        c.advance().unwrap();
        let mut csv = Vec::new();
        let mut fmt = crate::format::CsvFormatter::new();
        fmt.initialize(&schema, &mut c, &mut csv).unwrap();
        fmt.send_record(&mut c, &mut csv).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "2023-04-26T00:00:00.000Z,3.0\n"
        );
    }

    #[test]
    fn integer_array_with_wrong_element_count_is_fatal() {
        let schema = Schema::new(
            vec![
                FieldDef::new("Time", crate::schema::FieldType::Isotime).with_length(24),
                FieldDef::new("flags", crate::schema::FieldType::Integer).with_size(&[3]),
            ],
            TimeComponents::new(2020, 1, 1, 0, 0, 0),
            TimeComponents::new(2024, 1, 1, 0, 0, 0),
        )
        .unwrap();
        let mut c = BufferedCursor::new(vec![
            vec![
                DatumBuf::Isotime("2023-04-26T00:00:00.000Z".into()),
                DatumBuf::IntegerArray(vec![1, 2, 3]),
            ],
            vec![
                DatumBuf::Isotime("2023-04-26T00:01:00.000Z".into()),
                DatumBuf::IntegerArray(vec![1]),
            ],
        ]);
        c.advance().unwrap();
        let mut out = Vec::new();
        let mut fmt = JsonFormatter::new();
        fmt.initialize(&schema, &mut c, &mut out).unwrap();
        fmt.send_record(&mut c, &mut out).unwrap();
        assert!(c.advance().unwrap());
        assert!(fmt.send_record(&mut c, &mut out).is_err());
    }

    #[test]
    fn string_escaping() {
        let mut s = String::new();
        push_json_string("a\"b\\c\nd", &mut s);
        assert_eq!(s, r#""a\"b\\c\nd""#);
    }
}
