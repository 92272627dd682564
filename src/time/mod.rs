//! # Decomposed Calendar Time
//!
//! This module provides `TimeComponents`, the seven-component decomposed
//! calendar time used throughout the streaming core, and `TimeRange`, the
//! half-open interval built from a pair of them.
//!
//! All range arithmetic in the engine uses the decomposed representation
//! rather than an opaque timestamp. Source data arrives in several time
//! encodings (milliseconds since year 1, leap-second-aware nanoseconds since
//! J2000, pre-formatted strings), and converting everything to one scalar
//! epoch would bake one encoding's ambiguities into the engine. Decomposed
//! times compare lexicographically, order correctly across a leap second
//! (second = 60 sorts after 59), and step cleanly along calendar boundaries.
//!
//! ## Components
//!
//! | Component | Range | Notes |
//! |-----------|-------|-------|
//! | year | 1583.. | Gregorian calendar only |
//! | month | 1-12 | |
//! | day | 1-31 | bounded by month |
//! | hour | 0-23 | |
//! | minute | 0-59 | |
//! | second | 0-60 | 60 only during a positive leap second |
//! | nanos | 0-999999999 | |
//!
//! ## Epoch Decodings
//!
//! - [`TimeComponents::from_epoch_millis`]: milliseconds since 0001-01-01.
//! - [`TimeComponents::from_tt2000`]: nanoseconds since J2000 on the TT
//!   scale, converted through the leap-second table.

use eyre::{bail, eyre, Result};
use std::fmt;

use crate::config::{ISOTIME_FULL_LENGTH, ISOTIME_MIN_LENGTH};

/// Milliseconds between 0001-01-01T00:00 and 2000-01-01T00:00.
const EPOCH_Y1_TO_Y2000_MS: f64 = 6.3113904e13;

/// Nanoseconds between 2000-01-01T00:00:00 UTC and the J2000 epoch
/// (2000-01-01T11:58:55.816 UTC).
const J2000_OFFSET_NS: i64 = 43_135_816_000_000;

/// TAI-UTC at 2000-01-01.
const DAT_2000: i64 = 32;

/// Leap seconds inserted since 2000: (year, month, day, TAI-UTC from that
/// instant). The day is the first day the new offset applies.
const LEAP_SECONDS: [(i32, i32, i32, i64); 5] = [
    (2006, 1, 1, 33),
    (2009, 1, 1, 34),
    (2012, 7, 1, 35),
    (2015, 7, 1, 36),
    (2017, 1, 1, 37),
];

const DAYS_IN_MONTH: [i32; 13] = [0, 31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Seven-component decomposed calendar time.
///
/// Ordering is lexicographic over (year, month, day, hour, minute, second,
/// nanos), which is the calendar order as long as the components are within
/// their calendar ranges. Arithmetic helpers normalize their results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeComponents {
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
    pub second: i32,
    pub nanos: i64,
}

/// Additive calendar offset, applied component-wise then normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeDelta {
    pub years: i32,
    pub months: i32,
    pub days: i32,
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
    pub nanos: i64,
}

/// Calendar boundary unit for granule decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarCadence {
    Year,
    Month,
    Day,
    Hour,
}

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub fn days_in_month(year: i32, month: i32) -> i32 {
    if month == 2 && is_leap_year(year) {
        29
    } else {
        DAYS_IN_MONTH[month as usize]
    }
}

/// Days since 1970-01-01 for a civil date.
fn days_from_civil(year: i32, month: i32, day: i32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year } as i64;
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = ((month + 9) % 12) as i64;
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

/// Civil date from days since 1970-01-01.
fn civil_from_days(z: i64) -> (i32, i32, i32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as i32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as i32;
    let y = if m <= 2 { y + 1 } else { y } as i32;
    (y, m, d)
}

impl TimeComponents {
    pub fn new(year: i32, month: i32, day: i32, hour: i32, minute: i32, second: i32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            nanos: 0,
        }
    }

    /// Parse an ISO 8601 time. Accepts calendar dates ("2023-04-26"),
    /// day-of-year dates ("2023-116"), and any prefix truncation of
    /// "THH:MM:SS.NNNNNNNNN", with an optional trailing "Z".
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_suffix('Z').unwrap_or(s);
        if s.is_empty() {
            bail!("empty time string");
        }
        let (date, time) = match s.find(['T', ' ']) {
            Some(i) => (&s[..i], Some(&s[i + 1..])),
            None => (s, None),
        };

        let mut t = Self::new(0, 1, 1, 0, 0, 0);
        let dparts: Vec<&str> = date.split('-').collect();
        match dparts.len() {
            3 => {
                t.year = parse_component(dparts[0], "year")?;
                t.month = parse_component(dparts[1], "month")?;
                t.day = parse_component(dparts[2], "day")?;
            }
            2 if dparts[1].len() == 3 => {
                t.year = parse_component(dparts[0], "year")?;
                let doy = parse_component(dparts[1], "day of year")?;
                let (month, day) = month_day_from_doy(t.year, doy)?;
                t.month = month;
                t.day = day;
            }
            2 => {
                t.year = parse_component(dparts[0], "year")?;
                t.month = parse_component(dparts[1], "month")?;
            }
            1 => match date.len() {
                8 => {
                    t.year = parse_component(&date[..4], "year")?;
                    t.month = parse_component(&date[4..6], "month")?;
                    t.day = parse_component(&date[6..8], "day")?;
                }
                7 => {
                    t.year = parse_component(&date[..4], "year")?;
                    let doy = parse_component(&date[4..7], "day of year")?;
                    let (month, day) = month_day_from_doy(t.year, doy)?;
                    t.month = month;
                    t.day = day;
                }
                4 => {
                    t.year = parse_component(date, "year")?;
                }
                _ => bail!("unrecognized date: {:?}", date),
            },
            _ => bail!("unrecognized date: {:?}", date),
        }

        if t.month < 1 || t.month > 12 {
            bail!("month out of range in {:?}", s);
        }
        if t.day < 1 || t.day > days_in_month(t.year, t.month) {
            bail!("day out of range in {:?}", s);
        }

        if let Some(time) = time {
            let tparts: Vec<&str> = time.split(':').collect();
            if tparts.len() > 3 {
                bail!("unrecognized time: {:?}", time);
            }
            if !tparts.is_empty() && !tparts[0].is_empty() {
                t.hour = parse_component(tparts[0], "hour")?;
            }
            if tparts.len() > 1 {
                t.minute = parse_component(tparts[1], "minute")?;
            }
            if tparts.len() > 2 {
                let sec = tparts[2];
                match sec.find('.') {
                    Some(i) => {
                        t.second = parse_component(&sec[..i], "second")?;
                        let frac = &sec[i + 1..];
                        if frac.is_empty() || frac.len() > 9 {
                            bail!("bad fractional seconds in {:?}", time);
                        }
                        let scale = 10i64.pow(9 - frac.len() as u32);
                        t.nanos = frac
                            .parse::<i64>()
                            .map_err(|_| eyre!("bad fractional seconds in {:?}", time))?
                            * scale;
                    }
                    None => t.second = parse_component(sec, "second")?,
                }
            }
            if t.hour > 23 || t.minute > 59 || t.second > 60 {
                bail!("time component out of range in {:?}", s);
            }
        }
        Ok(t)
    }

    /// Full-resolution canonical form, "YYYY-MM-DDTHH:MM:SS.NNNNNNNNNZ".
    pub fn format_full(&self) -> String {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:09}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.nanos
        )
    }

    /// Canonical form truncated to `len` characters, always ending in 'Z'.
    /// Lengths are clamped to the minute-resolution minimum and the full
    /// nanosecond resolution.
    pub fn format_at_length(&self, len: usize) -> String {
        let full = self.format_full();
        if len >= ISOTIME_FULL_LENGTH {
            return full;
        }
        let len = len.max(ISOTIME_MIN_LENGTH);
        let mut s = full[..len - 1].to_string();
        // never leave a dangling separator before the marker
        if s.ends_with(['.', ':', '-', 'T']) {
            s.pop();
        }
        s.push('Z');
        s
    }

    /// Carry out-of-range components into their neighbors until each is
    /// within calendar range. Seconds >= 60 carry into minutes, so a
    /// genuine leap second must not be passed through normalization.
    pub fn normalize(&mut self) {
        const NANOS_PER_SEC: i64 = 1_000_000_000;
        let extra_sec = self.nanos.div_euclid(NANOS_PER_SEC);
        self.nanos = self.nanos.rem_euclid(NANOS_PER_SEC);
        self.second += extra_sec as i32;

        let carry = self.second.div_euclid(60);
        self.second = self.second.rem_euclid(60);
        self.minute += carry;
        let carry = self.minute.div_euclid(60);
        self.minute = self.minute.rem_euclid(60);
        self.hour += carry;
        let carry = self.hour.div_euclid(24);
        self.hour = self.hour.rem_euclid(24);
        self.day += carry;

        // months first so the day borrow below sees a valid month
        let m0 = self.month - 1;
        self.year += m0.div_euclid(12);
        self.month = m0.rem_euclid(12) + 1;

        while self.day < 1 {
            self.month -= 1;
            if self.month < 1 {
                self.month = 12;
                self.year -= 1;
            }
            self.day += days_in_month(self.year, self.month);
        }
        while self.day > days_in_month(self.year, self.month) {
            self.day -= days_in_month(self.year, self.month);
            self.month += 1;
            if self.month > 12 {
                self.month = 1;
                self.year += 1;
            }
        }
    }

    /// Component-wise addition, normalized.
    pub fn add(&self, delta: &TimeDelta) -> TimeComponents {
        let mut t = TimeComponents {
            year: self.year + delta.years,
            month: self.month + delta.months,
            day: self.day + delta.days,
            hour: self.hour + delta.hours,
            minute: self.minute + delta.minutes,
            second: self.second + delta.seconds,
            nanos: self.nanos + delta.nanos,
        };
        t.normalize();
        t
    }

    /// Floor to the cadence boundary at or before this time.
    pub fn floor_to(&self, cadence: CalendarCadence) -> TimeComponents {
        let mut t = *self;
        t.nanos = 0;
        t.second = 0;
        t.minute = 0;
        match cadence {
            CalendarCadence::Hour => {}
            CalendarCadence::Day => t.hour = 0,
            CalendarCadence::Month => {
                t.hour = 0;
                t.day = 1;
            }
            CalendarCadence::Year => {
                t.hour = 0;
                t.day = 1;
                t.month = 1;
            }
        }
        t
    }

    /// Step forward by one cadence unit.
    pub fn step(&self, cadence: CalendarCadence) -> TimeComponents {
        let mut t = *self;
        match cadence {
            CalendarCadence::Year => t.year += 1,
            CalendarCadence::Month => t.month += 1,
            CalendarCadence::Day => t.day += 1,
            CalendarCadence::Hour => t.hour += 1,
        }
        t.normalize();
        t
    }

    /// Decode milliseconds since 0001-01-01T00:00 (a common storage time
    /// encoding for science files).
    pub fn from_epoch_millis(ms: f64) -> TimeComponents {
        let us2000 = (ms - EPOCH_Y1_TO_Y2000_MS) * 1000.0;
        Self::from_us2000(us2000)
    }

    /// Decode nanoseconds since J2000 on the TT scale, applying the
    /// leap-second table. Times during a positive leap second land on the
    /// following second.
    pub fn from_tt2000(t: i64) -> TimeComponents {
        let mut dat = DAT_2000;
        for &(y, m, d, dat_after) in LEAP_SECONDS.iter() {
            let utc_ns2000 =
                (days_from_civil(y, m, d) - days_from_civil(2000, 1, 1)) * 86_400_000_000_000;
            let threshold = utc_ns2000 - J2000_OFFSET_NS + (dat_after - DAT_2000) * 1_000_000_000;
            if t >= threshold {
                dat = dat_after;
            }
        }
        let ns2000 = t + J2000_OFFSET_NS - (dat - DAT_2000) * 1_000_000_000;
        let day = ns2000.div_euclid(86_400_000_000_000);
        let ns_of_day = ns2000.rem_euclid(86_400_000_000_000);
        let (year, month, dom) = civil_from_days(day + days_from_civil(2000, 1, 1));
        let sec_of_day = ns_of_day / 1_000_000_000;
        TimeComponents {
            year,
            month,
            day: dom,
            hour: (sec_of_day / 3600) as i32,
            minute: (sec_of_day % 3600 / 60) as i32,
            second: (sec_of_day % 60) as i32,
            nanos: ns_of_day % 1_000_000_000,
        }
    }

    /// Decode whole seconds since 1970-01-01T00:00 (file modification
    /// times).
    pub fn from_unix_seconds(secs: i64) -> TimeComponents {
        let day = secs.div_euclid(86_400);
        let sec_of_day = secs.rem_euclid(86_400);
        let (year, month, dom) = civil_from_days(day);
        TimeComponents {
            year,
            month,
            day: dom,
            hour: (sec_of_day / 3600) as i32,
            minute: (sec_of_day % 3600 / 60) as i32,
            second: (sec_of_day % 60) as i32,
            nanos: 0,
        }
    }

    fn from_us2000(us: f64) -> TimeComponents {
        let day = (us / 86_400_000_000.0).floor();
        let us_of_day = us - day * 86_400_000_000.0;
        let (year, month, dom) = civil_from_days(day as i64 + days_from_civil(2000, 1, 1));
        let nanos_of_day = (us_of_day * 1000.0).round() as i64;
        let sec_of_day = nanos_of_day / 1_000_000_000;
        TimeComponents {
            year,
            month,
            day: dom,
            hour: (sec_of_day / 3600) as i32,
            minute: (sec_of_day % 3600 / 60) as i32,
            second: (sec_of_day % 60) as i32,
            nanos: nanos_of_day % 1_000_000_000,
        }
    }
}

impl fmt::Display for TimeComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_full())
    }
}

fn parse_component(s: &str, what: &str) -> Result<i32> {
    s.parse::<i32>()
        .map_err(|_| eyre!("cannot parse {} from {:?}", what, s))
}

fn month_day_from_doy(year: i32, doy: i32) -> Result<(i32, i32)> {
    let ydays = if is_leap_year(year) { 366 } else { 365 };
    if doy < 1 || doy > ydays {
        bail!("day of year {} out of range for {}", doy, year);
    }
    let mut rem = doy;
    let mut month = 1;
    while rem > days_in_month(year, month) {
        rem -= days_in_month(year, month);
        month += 1;
    }
    Ok((month, rem))
}

/// Parse an ISO 8601 duration, e.g. "PT1800S", "P1D", "-PT30M".
pub fn parse_iso8601_duration(s: &str) -> Result<TimeDelta> {
    let (sign, body) = match s.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1, s),
    };
    let body = body
        .strip_prefix('P')
        .ok_or_else(|| eyre!("duration must start with P: {:?}", s))?;
    let mut delta = TimeDelta::default();
    let mut in_time = false;
    let mut num = String::new();
    for c in body.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' | '.' => num.push(c),
            _ => {
                let empty = num.is_empty();
                let take = |num: &mut String| -> Result<i64> {
                    let v = num
                        .parse::<i64>()
                        .map_err(|_| eyre!("bad duration field in {:?}", s))?;
                    num.clear();
                    Ok(sign * v)
                };
                if empty {
                    bail!("bad duration: {:?}", s);
                }
                match (c, in_time) {
                    ('Y', false) => delta.years = take(&mut num)? as i32,
                    ('M', false) => delta.months = take(&mut num)? as i32,
                    ('D', false) => delta.days = take(&mut num)? as i32,
                    ('H', true) => delta.hours = take(&mut num)? as i32,
                    ('M', true) => delta.minutes = take(&mut num)? as i32,
                    ('S', true) => {
                        let v = num
                            .parse::<f64>()
                            .map_err(|_| eyre!("bad duration field in {:?}", s))?;
                        num.clear();
                        delta.seconds = (sign as f64 * v.trunc()) as i32;
                        delta.nanos = (sign as f64 * v.fract() * 1e9).round() as i64;
                    }
                    _ => bail!("unrecognized duration field {:?} in {:?}", c, s),
                }
            }
        }
    }
    if !num.is_empty() {
        bail!("trailing digits in duration: {:?}", s);
    }
    Ok(delta)
}

/// Half-open time interval [start, stop).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: TimeComponents,
    pub stop: TimeComponents,
}

impl TimeRange {
    pub fn new(start: TimeComponents, stop: TimeComponents) -> Self {
        Self { start, stop }
    }

    /// Parse "start/stop" where both halves are ISO 8601 times.
    pub fn parse(s: &str) -> Result<Self> {
        let (a, b) = s
            .split_once('/')
            .ok_or_else(|| eyre!("time range must be start/stop: {:?}", s))?;
        Ok(Self::new(TimeComponents::parse(a)?, TimeComponents::parse(b)?))
    }

    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }

    pub fn contains(&self, t: &TimeComponents) -> bool {
        &self.start <= t && t < &self.stop
    }

    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start < other.stop && other.start < self.stop
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.stop)
    }
}

/// Reformat an ISO 8601 time to the declared field length, ending in 'Z'.
pub fn reformat_isotime(len: usize, s: &str) -> Result<String> {
    let t = TimeComponents::parse(s)?;
    Ok(t.format_at_length(len))
}
