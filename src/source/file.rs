//! Daily/hourly pre-formatted CSV files as a record source.
//!
//! Files are addressed by a template path with `$Y`, `$m`, `$d`, `$H`
//! substitutions, one file per calendar unit at the template's finest
//! specifier. A missing file is an empty granule (gaps in archives are
//! routine); an unreadable or unparseable file fails its granule and the
//! aggregation layer ends the stream early.

use std::fs;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use eyre::{ensure, Result, WrapErr};

use crate::records::{BufferedCursor, RecordCursor};
use crate::schema::Schema;
use crate::time::{CalendarCadence, TimeComponents, TimeRange};

use super::{calendar_granules, parse_record_line, RecordSource};

pub struct DailyFileSource {
    template: String,
    cadence: CalendarCadence,
    schema: Schema,
}

impl DailyFileSource {
    /// The template must contain at least `$Y`; the finest specifier
    /// present determines the granule cadence.
    pub fn new(template: impl Into<String>, schema: Schema) -> Result<Self> {
        let template = template.into();
        ensure!(
            template.contains("$Y"),
            "file template {:?} has no $Y year specifier",
            template
        );
        let cadence = if template.contains("$H") {
            CalendarCadence::Hour
        } else if template.contains("$d") {
            CalendarCadence::Day
        } else if template.contains("$m") {
            CalendarCadence::Month
        } else {
            CalendarCadence::Year
        };
        Ok(Self {
            template,
            cadence,
            schema,
        })
    }

    pub fn cadence(&self) -> CalendarCadence {
        self.cadence
    }

    fn path_for(&self, t: &TimeComponents) -> PathBuf {
        PathBuf::from(
            self.template
                .replace("$Y", &format!("{:04}", t.year))
                .replace("$m", &format!("{:02}", t.month))
                .replace("$d", &format!("{:02}", t.day))
                .replace("$H", &format!("{:02}", t.hour)),
        )
    }
}

impl RecordSource for DailyFileSource {
    fn has_granules(&self) -> bool {
        true
    }

    fn granules(&self, window: &TimeRange) -> Result<Vec<TimeRange>> {
        calendar_granules(window, self.cadence)
    }

    fn has_field_projection(&self) -> bool {
        false
    }

    fn records(
        &self,
        window: &TimeRange,
        _fields: Option<&[String]>,
    ) -> Result<Box<dyn RecordCursor + '_>> {
        let path = self.path_for(&window.start);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no file for granule");
                return Ok(Box::new(BufferedCursor::new(Vec::new())));
            }
            Err(err) => {
                return Err(err).wrap_err_with(|| format!("reading {}", path.display()));
            }
        };
        let mut rows = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let row = parse_record_line(&self.schema, line)
                .wrap_err_with(|| format!("{}:{}", path.display(), lineno + 1))?;
            rows.push(row);
        }
        Ok(Box::new(BufferedCursor::new(rows)))
    }

    fn last_modified(&self, window: &TimeRange) -> Option<TimeComponents> {
        let granules = calendar_granules(window, self.cadence).ok()?;
        let mut latest = None;
        for g in granules {
            let meta = match fs::metadata(self.path_for(&g.start)) {
                Ok(m) => m,
                Err(_) => continue,
            };
            let secs = meta
                .modified()
                .ok()?
                .duration_since(UNIX_EPOCH)
                .ok()?
                .as_secs() as i64;
            let t = TimeComponents::from_unix_seconds(secs);
            if latest.map(|l| t > l).unwrap_or(true) {
                latest = Some(t);
            }
        }
        latest
    }
}
