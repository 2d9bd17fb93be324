// ⏰ Temporal Model - SeisComP timestamps and validity intervals
//
// Every network, station, location and stream carries an epoch: the
// half-open interval [start, end) during which that configuration applies.
// An absent end means the epoch is still open.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Formats a timestamp the way SeisComP writes it: `YYYY-MM-DDThh:mm:ss.ffffZ`.
///
/// Four fractional digits are always written. Finer precision is kept by
/// extending the fraction so that parsing the output gives the same instant.
pub fn format_time(time: &DateTime<Utc>) -> String {
    let nanos = time.timestamp_subsec_nanos();
    let fraction = if nanos % 100_000 == 0 {
        format!("{:04}", nanos / 100_000)
    } else {
        let full = format!("{:09}", nanos);
        full.trim_end_matches('0').to_string()
    };
    format!("{}.{}Z", time.format("%Y-%m-%dT%H:%M:%S"), fraction)
}

/// Parses the timestamp spellings found in inventory files and typed into
/// the editor:
///
/// - `YYYY-MM-DD`
/// - `YYYY-MM-DD hh:mm:ss`
/// - `YYYY-MM-DDThh:mm:ss`, optionally followed by `Z`
/// - any of the above with a fractional second
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let text = text.strip_suffix('Z').unwrap_or(text);

    if !text.contains('T') && !text.contains(' ') {
        let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }

    let normalized = text.replacen(' ', "T", 1);
    let format = if normalized.contains('.') {
        "%Y-%m-%dT%H:%M:%S%.f"
    } else {
        "%Y-%m-%dT%H:%M:%S"
    };
    NaiveDateTime::parse_from_str(&normalized, format)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Converts any accepted spelling to the canonical SeisComP form.
///
/// Returns `None` for text that is not a valid timestamp. Editor fields use
/// this to rewrite what the user typed once editing finishes.
pub fn normalize_datetime(text: &str) -> Option<String> {
    parse_time(text).map(|t| format_time(&t))
}

// ============================================================================
// EPOCH
// ============================================================================

/// Validity interval `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Epoch {
    pub start: DateTime<Utc>,

    /// `None` = open-ended (extends to +infinity)
    pub end: Option<DateTime<Utc>>,
}

impl Epoch {
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Epoch { start, end }
    }

    /// Open-ended epoch starting at `start`
    pub fn open(start: DateTime<Utc>) -> Self {
        Epoch { start, end: None }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// End, if present, must be strictly after start.
    pub fn is_ordered(&self) -> bool {
        self.end.map_or(true, |end| end > self.start)
    }

    /// Check if this epoch was valid at a specific time
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && self.end.map_or(true, |end| end > time)
    }

    /// Half-open overlap test. Touching boundaries do not overlap:
    /// `[2000, 2010)` and `[2010, open)` are disjoint.
    pub fn overlaps(&self, other: &Epoch) -> bool {
        let starts_before_other_ends = other.end.map_or(true, |end| self.start < end);
        let other_starts_before_end = self.end.map_or(true, |end| other.start < end);
        starts_before_other_ends && other_starts_before_end
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.end {
            Some(end) => write!(f, "[{}, {})", format_time(&self.start), format_time(end)),
            None => write!(f, "[{}, open)", format_time(&self.start)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
