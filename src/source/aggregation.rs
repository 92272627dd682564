//! # Granule Aggregation
//!
//! Splices a sequence of per-granule record streams into one continuous
//! stream for the request window. The cursor is an explicit state machine:
//!
//! ```text
//!   AwaitGranule ──open next granule──► InGranule ──exhausted──┐
//!        ▲                                                     │
//!        └─────────────────────────────────────────────────────┘
//!        │  granules exhausted, granule past window stop,
//!        │  or granule open/advance failure
//!        ▼
//!       Done
//! ```
//!
//! Granules wholly before the window start are skipped without opening
//! them; the first granule starting at or past the window stop ends the
//! stream. A granule that fails to open or advance ends the stream early
//! with a warning, serving the records delivered so far. Pre-granule
//! configuration problems (an inverted granule) are fatal instead.

use eyre::{bail, Result};

use crate::records::{Datum, Record, RecordCursor};
use crate::time::TimeRange;

use super::RecordSource;

enum State<'a> {
    AwaitGranule,
    InGranule(Box<dyn RecordCursor + 'a>),
    Done,
}

pub struct AggregatingCursor<'a> {
    source: &'a dyn RecordSource,
    dataset: String,
    window: TimeRange,
    fields: Option<Vec<String>>,
    granules: std::vec::IntoIter<TimeRange>,
    state: State<'a>,
}

impl<'a> AggregatingCursor<'a> {
    /// `fields` is forwarded to each per-granule open only when the source
    /// projects fields itself.
    pub fn new(
        source: &'a dyn RecordSource,
        dataset: impl Into<String>,
        window: TimeRange,
        fields: Option<Vec<String>>,
    ) -> Result<Self> {
        let granules = source.granules(&window)?;
        Ok(Self {
            source,
            dataset: dataset.into(),
            window,
            fields,
            granules: granules.into_iter(),
            state: State::AwaitGranule,
        })
    }

    /// Open the next relevant granule, or None when the stream is over.
    fn open_next(&mut self) -> Result<Option<Box<dyn RecordCursor + 'a>>> {
        loop {
            let granule = match self.granules.next() {
                Some(g) => g,
                None => return Ok(None),
            };
            if granule.is_empty() {
                bail!(
                    "dataset {:?}: granule {} is empty or inverted",
                    self.dataset,
                    granule
                );
            }
            if granule.stop <= self.window.start {
                continue;
            }
            if granule.start >= self.window.stop {
                return Ok(None);
            }
            match self.source.records(&granule, self.fields.as_deref()) {
                Ok(cursor) => return Ok(Some(cursor)),
                Err(err) => {
                    tracing::warn!(
                        dataset = %self.dataset,
                        granule = %granule,
                        error = %format!("{:#}", err),
                        "granule unavailable, ending stream early"
                    );
                    return Ok(None);
                }
            }
        }
    }
}

impl<'a> Record for AggregatingCursor<'a> {
    fn field_count(&self) -> usize {
        match &self.state {
            State::InGranule(c) => c.field_count(),
            _ => 0,
        }
    }

    fn field(&mut self, i: usize) -> Result<Datum<'_>> {
        match &mut self.state {
            State::InGranule(c) => c.field(i),
            _ => bail!("cursor is not positioned on a record"),
        }
    }
}

impl<'a> RecordCursor for AggregatingCursor<'a> {
    fn advance(&mut self) -> Result<bool> {
        loop {
            match &mut self.state {
                State::Done => return Ok(false),
                State::AwaitGranule => match self.open_next()? {
                    Some(cursor) => self.state = State::InGranule(cursor),
                    None => {
                        self.state = State::Done;
                        return Ok(false);
                    }
                },
                State::InGranule(cursor) => match cursor.advance() {
                    Ok(true) => return Ok(true),
                    Ok(false) => self.state = State::AwaitGranule,
                    Err(err) => {
                        tracing::warn!(
                            dataset = %self.dataset,
                            error = %format!("{:#}", err),
                            "granule stream failed, ending stream early"
                        );
                        self.state = State::Done;
                        return Ok(false);
                    }
                },
            }
        }
    }
}
