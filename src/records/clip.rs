//! Window restriction on a record stream.
//!
//! Granule boundaries rarely align with the requested window, so the first
//! and last granule of an aggregated stream can carry records outside
//! [start, stop). This cursor skips records before the window start, ends
//! the stream at the first record at or past the stop, and verifies that
//! record times never decrease. The time tag is read from field 0, which the
//! schema guarantees is an isotime.

use eyre::{Result, WrapErr};

use super::{Datum, Record, RecordCursor};
use crate::time::{TimeComponents, TimeRange};

pub struct ClipCursor<C> {
    inner: C,
    window: TimeRange,
    last: Option<TimeComponents>,
    done: bool,
}

impl<C: RecordCursor> ClipCursor<C> {
    pub fn new(inner: C, window: TimeRange) -> Self {
        Self {
            inner,
            window,
            last: None,
            done: false,
        }
    }

    fn current_time(&mut self) -> Result<TimeComponents> {
        let tag = self.inner.field(0)?;
        let s = match tag {
            Datum::Isotime(s) => s,
            other => eyre::bail!("record time tag is {}, expected isotime", other.kind()),
        };
        TimeComponents::parse(s).wrap_err("unparseable record time tag")
    }
}

impl<C: RecordCursor> Record for ClipCursor<C> {
    fn field_count(&self) -> usize {
        self.inner.field_count()
    }

    fn field(&mut self, i: usize) -> Result<Datum<'_>> {
        self.inner.field(i)
    }
}

impl<C: RecordCursor> RecordCursor for ClipCursor<C> {
    fn advance(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        loop {
            if !self.inner.advance()? {
                self.done = true;
                return Ok(false);
            }
            let t = self.current_time()?;
            if t < self.window.start {
                continue;
            }
            if t >= self.window.stop {
                self.done = true;
                return Ok(false);
            }
            if let Some(last) = self.last {
                eyre::ensure!(
                    t >= last,
                    "records out of time order: {} after {}",
                    t,
                    last
                );
            }
            self.last = Some(t);
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{BufferedCursor, DatumBuf};

    fn rows(times: &[&str]) -> BufferedCursor {
        BufferedCursor::new(
            times
                .iter()
                .map(|t| vec![DatumBuf::Isotime(t.to_string()), DatumBuf::Double(1.0)])
                .collect(),
        )
    }

    fn window() -> TimeRange {
        TimeRange::parse("2023-04-26T00:00Z/2023-04-27T00:00Z").unwrap()
    }

    #[test]
    fn skips_before_start_and_stops_at_stop() {
        let c = rows(&[
            "2023-04-25T23:00Z",
            "2023-04-26T00:00Z",
            "2023-04-26T12:00Z",
            "2023-04-27T00:00Z",
            "2023-04-27T01:00Z",
        ]);
        let mut clip = ClipCursor::new(c, window());
        let mut seen = Vec::new();
        while clip.advance().unwrap() {
            seen.push(clip.field(0).unwrap().as_isotime().unwrap().to_string());
        }
        assert_eq!(seen, vec!["2023-04-26T00:00Z", "2023-04-26T12:00Z"]);
        // terminal: further advances stay exhausted
        assert!(!clip.advance().unwrap());
    }

    #[test]
    fn rejects_time_going_backwards() {
        let c = rows(&["2023-04-26T12:00Z", "2023-04-26T06:00Z"]);
        let mut clip = ClipCursor::new(c, window());
        assert!(clip.advance().unwrap());
        assert!(clip.advance().is_err());
    }

    #[test]
    fn equal_times_are_allowed() {
        let c = rows(&["2023-04-26T12:00Z", "2023-04-26T12:00Z"]);
        let mut clip = ClipCursor::new(c, window());
        assert!(clip.advance().unwrap());
        assert!(clip.advance().unwrap());
    }
}
