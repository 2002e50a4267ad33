//! Representative still-frame offset selection.
//!
//! The encode pass can carry a black-frame detection filter whose report
//! lands on stderr. This module parses that report into intervals and picks
//! a grab offset that avoids them. The avoidance is best effort: a source
//! that is mostly black still yields an offset, it may just land on a dark
//! frame.

use once_cell::sync::Lazy;
use regex::Regex;

/// One detected black interval, in whole seconds. `end` is rounded up to
/// the next second when parsed so the interval covers its fractional tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlackInterval {
    pub start: u64,
    pub end: u64,
}

static BLACK_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"black_start:(\d+)(?:\.\d+)?\s+black_end:(\d+)(?:\.\d+)?")
        .expect("static pattern")
});

/// Extracts black intervals from captured encoder diagnostics.
pub fn scan_black_intervals(lines: &[String]) -> Vec<BlackInterval> {
    let mut intervals = Vec::new();
    for line in lines {
        if let Some(caps) = BLACK_LINE.captures(line) {
            let start: u64 = caps[1].parse().unwrap_or_default();
            let end: u64 = caps[2].parse().unwrap_or_default();
            intervals.push(BlackInterval {
                start,
                // Cover the fractional tail of the detected range.
                end: end + 1,
            });
        }
    }
    intervals
}

/// Whether a candidate second is clear of one interval, with one second of
/// margin on both ends: `c` clashes exactly when `start-1 <= c <= end+1`.
fn clashes(candidate: u64, interval: &BlackInterval) -> bool {
    candidate >= interval.start.saturating_sub(1) && candidate <= interval.end + 1
}

/// Whether a candidate second is clear of every interval.
pub fn is_clear(candidate: u64, intervals: &[BlackInterval]) -> bool {
    intervals.iter().all(|iv| !clashes(candidate, iv))
}

/// Strategy seam for still-frame offset selection, so a scoring-based
/// selector could replace the interval heuristic without touching the
/// pipeline driver.
pub trait OffsetStrategy {
    fn choose(&self, duration_seconds: u64, intervals: &[BlackInterval]) -> u64;
}

/// Default strategy: fixed fractions of the duration, stepped until one
/// clears the detected intervals.
///
/// Preference order:
/// 1. no intervals: a third of the duration;
/// 2. a quarter of the duration, if clear;
/// 3. duration divided by 2, 3 then 4, first clear candidate wins;
/// 4. with three or more intervals, the midpoint between the second
///    interval's end and the third's start, when strictly between them;
/// 5. half the duration, accepting a possible black frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlackspaceAvoidance;

impl OffsetStrategy for BlackspaceAvoidance {
    fn choose(&self, duration_seconds: u64, intervals: &[BlackInterval]) -> u64 {
        if intervals.is_empty() {
            return duration_seconds / 3;
        }

        let quarter = duration_seconds / 4;
        if is_clear(quarter, intervals) {
            return quarter;
        }

        for divisor in 2..=4 {
            let candidate = duration_seconds / divisor;
            if is_clear(candidate, intervals) {
                return candidate;
            }
        }

        if intervals.len() > 2 {
            let gap_start = intervals[1].end;
            let gap_end = intervals[2].start;
            if gap_end > gap_start {
                let midpoint = gap_start + (gap_end - gap_start) / 2;
                if midpoint > gap_start && midpoint < gap_end {
                    return midpoint;
                }
            }
        }

        duration_seconds / 2
    }
}
