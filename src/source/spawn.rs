//! Records read from a spawned subprocess.
//!
//! The backend runs an external reader command once per request, with the
//! window start and stop substituted into its argument template as `$start`
//! and `$stop`. The child writes CSV records to stdout; the cursor parses
//! them line by line against the schema. Dropping the cursor kills and
//! reaps the child, so cancelling a request releases the process promptly.

use std::io::{BufRead, BufReader, Lines};
use std::process::{Child, ChildStdout, Command, Stdio};

use eyre::{eyre, Result, WrapErr};

use crate::records::{Datum, DatumBuf, Record, RecordCursor};
use crate::schema::Schema;
use crate::time::{TimeComponents, TimeRange};

use super::{parse_record_line, RecordSource};

pub struct SpawnSource {
    program: String,
    args: Vec<String>,
    schema: Schema,
}

impl SpawnSource {
    pub fn new(program: impl Into<String>, args: Vec<String>, schema: Schema) -> Self {
        Self {
            program: program.into(),
            args,
            schema,
        }
    }
}

impl RecordSource for SpawnSource {
    fn has_granules(&self) -> bool {
        false
    }

    fn granules(&self, _window: &TimeRange) -> Result<Vec<TimeRange>> {
        Ok(Vec::new())
    }

    fn has_field_projection(&self) -> bool {
        false
    }

    fn records(
        &self,
        window: &TimeRange,
        _fields: Option<&[String]>,
    ) -> Result<Box<dyn RecordCursor + '_>> {
        let start = window.start.format_full();
        let stop = window.stop.format_full();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace("$start", &start).replace("$stop", &stop))
            .collect();
        tracing::debug!(program = %self.program, ?args, "spawning reader");
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .wrap_err_with(|| format!("spawning {:?}", self.program))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| eyre!("child has no stdout"))?;
        Ok(Box::new(SpawnCursor {
            child,
            lines: BufReader::new(stdout).lines(),
            schema: &self.schema,
            row: Vec::new(),
        }))
    }

    fn last_modified(&self, _window: &TimeRange) -> Option<TimeComponents> {
        None
    }
}

struct SpawnCursor<'a> {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    schema: &'a Schema,
    row: Vec<DatumBuf>,
}

impl Record for SpawnCursor<'_> {
    fn field_count(&self) -> usize {
        self.row.len()
    }

    fn field(&mut self, i: usize) -> Result<Datum<'_>> {
        self.row
            .get(i)
            .map(|d| d.as_datum())
            .ok_or_else(|| eyre!("cursor is not positioned on a record"))
    }
}

impl RecordCursor for SpawnCursor<'_> {
    fn advance(&mut self) -> Result<bool> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line.wrap_err("reading child stdout")?,
                None => {
                    self.row.clear();
                    return Ok(false);
                }
            };
            if line.is_empty() {
                continue;
            }
            self.row = parse_record_line(self.schema, &line)?;
            return Ok(true);
        }
    }
}

impl Drop for SpawnCursor<'_> {
    fn drop(&mut self) {
        // the child may already have exited; reap it either way
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType};

    fn schema() -> Schema {
        Schema::new(
            vec![
                FieldDef::new("Time", FieldType::Isotime).with_length(30),
                FieldDef::new("density", FieldType::Double).with_fill("-1e31"),
            ],
            TimeComponents::new(2020, 1, 1, 0, 0, 0),
            TimeComponents::new(2024, 1, 1, 0, 0, 0),
        )
        .unwrap()
    }

    fn window() -> TimeRange {
        TimeRange::parse("2023-04-26T00:00Z/2023-04-27T00:00Z").unwrap()
    }

    #[test]
    fn reads_child_output() {
        let src = SpawnSource::new(
            "sh",
            vec![
                "-c".to_string(),
                "printf '2023-04-26T00:00:00.000000000Z,1.5\\n2023-04-26T12:00:00.000000000Z,2.5\\n'"
                    .to_string(),
            ],
            schema(),
        );
        let mut c = src.records(&window(), None).unwrap();
        assert!(c.advance().unwrap());
        assert_eq!(c.field(1).unwrap().as_double().unwrap(), 1.5);
        assert!(c.advance().unwrap());
        assert_eq!(c.field(1).unwrap().as_double().unwrap(), 2.5);
        assert!(!c.advance().unwrap());
    }

    #[test]
    fn substitutes_window_into_arguments() {
        let src = SpawnSource::new(
            "sh",
            vec!["-c".to_string(), "echo $start,1.0".to_string()],
            schema(),
        );
        let mut c = src.records(&window(), None).unwrap();
        assert!(c.advance().unwrap());
        assert_eq!(
            c.field(0).unwrap().as_isotime().unwrap(),
            "2023-04-26T00:00:00.000000000Z"
        );
    }

    #[test]
    fn missing_program_is_an_error() {
        let src = SpawnSource::new("/nonexistent/reader", Vec::new(), schema());
        assert!(src.records(&window(), None).is_err());
    }

    #[test]
    fn bad_child_output_is_an_error() {
        let src = SpawnSource::new(
            "sh",
            vec!["-c".to_string(), "echo not-a-record".to_string()],
            schema(),
        );
        let mut c = src.records(&window(), None).unwrap();
        assert!(c.advance().is_err());
    }
}
