//! Records proxied from a remote server speaking the same protocol.
//!
//! The backend forwards each request to another server's data endpoint,
//! substituting the window into `time.min`/`time.max` query parameters, and
//! parses the CSV stream it gets back against the local schema. The remote
//! end applies field projection itself, so requested field names are passed
//! through as a `parameters` query parameter and the reply is parsed
//! against the matching schema subset.

use std::io::{BufRead, BufReader, Lines};

use eyre::{Result, WrapErr};

use crate::records::{Datum, DatumBuf, Record, RecordCursor};
use crate::schema::Schema;
use crate::time::{TimeComponents, TimeRange};

use super::{parse_record_line, RecordSource};

pub struct RemoteSource {
    server: String,
    id: String,
    schema: Schema,
    client: reqwest::blocking::Client,
}

impl RemoteSource {
    /// `server` is the remote base URL, e.g. `https://example.org/hs`.
    pub fn new(server: impl Into<String>, id: impl Into<String>, schema: Schema) -> Self {
        let server = server.into().trim_end_matches('/').to_string();
        Self {
            server,
            id: id.into(),
            schema,
            client: reqwest::blocking::Client::new(),
        }
    }

    fn data_url(&self, window: &TimeRange, fields: Option<&[String]>) -> String {
        let mut url = format!(
            "{}/data?id={}&time.min={}&time.max={}",
            self.server,
            self.id,
            window.start.format_full(),
            window.stop.format_full(),
        );
        if let Some(fields) = fields {
            if !fields.is_empty() {
                url.push_str("&parameters=");
                url.push_str(&fields.join(","));
            }
        }
        url
    }
}

impl RecordSource for RemoteSource {
    fn has_granules(&self) -> bool {
        false
    }

    fn granules(&self, _window: &TimeRange) -> Result<Vec<TimeRange>> {
        Ok(Vec::new())
    }

    fn has_field_projection(&self) -> bool {
        true
    }

    fn records(
        &self,
        window: &TimeRange,
        fields: Option<&[String]>,
    ) -> Result<Box<dyn RecordCursor + '_>> {
        // the remote reply carries only the requested fields, so the
        // cursor parses against the matching subset
        let schema = match fields {
            Some(names) => {
                let map = self.schema.projection(names)?;
                self.schema.subset(&map)?
            }
            None => self.schema.clone(),
        };
        let url = self.data_url(window, fields);
        tracing::debug!(%url, "opening remote stream");
        let response = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .wrap_err_with(|| format!("remote request {url} failed"))?;
        Ok(Box::new(RemoteCursor {
            lines: BufReader::new(response).lines(),
            schema,
            row: Vec::new(),
        }))
    }

    fn last_modified(&self, _window: &TimeRange) -> Option<TimeComponents> {
        None
    }
}

struct RemoteCursor {
    lines: Lines<BufReader<reqwest::blocking::Response>>,
    schema: Schema,
    row: Vec<DatumBuf>,
}

impl Record for RemoteCursor {
    fn field_count(&self) -> usize {
        self.row.len()
    }

    fn field(&mut self, i: usize) -> Result<Datum<'_>> {
        self.row
            .get(i)
            .map(|d| d.as_datum())
            .ok_or_else(|| eyre::eyre!("cursor is not positioned on a record"))
    }
}

impl RecordCursor for RemoteCursor {
    fn advance(&mut self) -> Result<bool> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line.wrap_err("reading remote stream")?,
                None => {
                    self.row.clear();
                    return Ok(false);
                }
            };
            if line.is_empty() {
                continue;
            }
            self.row = parse_record_line(&self.schema, &line)?;
            return Ok(true);
        }
    }
}
