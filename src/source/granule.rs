//! Calendar decomposition of a request window.
//!
//! File-backed sources store one file per calendar unit, so their granules
//! are the calendar-aligned intervals touching the window: floor the window
//! start to the cadence boundary, then step one unit at a time until the
//! boundary reaches the window stop. Granules at the edges deliberately
//! overrun the window; the clip cursor restricts the records later.

use eyre::{ensure, Result};

use crate::time::{CalendarCadence, TimeRange};

/// The calendar-aligned granules intersecting `window`, ascending.
pub fn calendar_granules(window: &TimeRange, cadence: CalendarCadence) -> Result<Vec<TimeRange>> {
    ensure!(
        !window.is_empty(),
        "window {} is empty or inverted",
        window
    );
    let mut granules = Vec::new();
    let mut start = window.start.floor_to(cadence);
    while start < window.stop {
        let stop = start.step(cadence);
        granules.push(TimeRange::new(start, stop));
        start = stop;
    }
    Ok(granules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeComponents;

    #[test]
    fn five_day_window_gives_five_day_granules() {
        let w = TimeRange::parse("2023-04-24T00:00Z/2023-04-29T00:00Z").unwrap();
        let g = calendar_granules(&w, CalendarCadence::Day).unwrap();
        assert_eq!(g.len(), 5);
        assert_eq!(g[0].start, TimeComponents::new(2023, 4, 24, 0, 0, 0));
        assert_eq!(g[4].stop, TimeComponents::new(2023, 4, 29, 0, 0, 0));
        for pair in g.windows(2) {
            assert_eq!(pair[0].stop, pair[1].start);
        }
    }

    #[test]
    fn partial_days_round_outward() {
        let w = TimeRange::parse("2023-04-26T06:00Z/2023-04-27T18:00Z").unwrap();
        let g = calendar_granules(&w, CalendarCadence::Day).unwrap();
        assert_eq!(g.len(), 2);
        // the first granule starts before the window, the last ends after
        assert_eq!(g[0].start, TimeComponents::new(2023, 4, 26, 0, 0, 0));
        assert_eq!(g[1].stop, TimeComponents::new(2023, 4, 28, 0, 0, 0));
    }

    #[test]
    fn month_granules_cross_year_end() {
        let w = TimeRange::parse("2023-11-15T00:00Z/2024-02-01T00:00Z").unwrap();
        let g = calendar_granules(&w, CalendarCadence::Month).unwrap();
        assert_eq!(g.len(), 3);
        assert_eq!(g[2].start, TimeComponents::new(2024, 1, 1, 0, 0, 0));
    }

    #[test]
    fn sub_day_window_gives_one_granule() {
        let w = TimeRange::parse("2023-04-26T06:00Z/2023-04-26T07:30Z").unwrap();
        let g = calendar_granules(&w, CalendarCadence::Day).unwrap();
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let w = TimeRange::parse("2023-04-27T00:00Z/2023-04-26T00:00Z").unwrap();
        assert!(calendar_granules(&w, CalendarCadence::Day).is_err());
    }
}
