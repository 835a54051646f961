// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Temporal Validation
//!
//! Pure interval arithmetic for captured events: duration in whole minutes,
//! half-open overlap detection and future-dating checks.
//!
//! Instants are always interpreted in the UTC offset captured with the
//! event. The reference "now" comes from the capturing device through
//! [`Clock`], never from a server.

mod clock;

pub use clock::{Clock, FixedClock, SystemClock};

use std::fmt;

use thiserror::Error;
use time::{Date, OffsetDateTime, UtcOffset};

/// Which end of an interval failed a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Start,
    End,
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeField::Start => f.write_str("start time"),
            TimeField::End => f.write_str("end time"),
        }
    }
}

/// Temporal validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemporalError {
    #[error("invalid interval: end {end} is not after start {start}")]
    InvalidInterval {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },

    #[error("{field} {at} is later than the capture clock ({now})")]
    FutureDate {
        field: TimeField,
        at: OffsetDateTime,
        now: OffsetDateTime,
    },
}

/// A validated time span.
///
/// With an end the span is the half-open interval `[start, end)` and
/// `end > start` always holds. Without an end it is the single instant
/// `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    start: OffsetDateTime,
    end: Option<OffsetDateTime>,
}

impl Interval {
    /// Builds an interval, rejecting an end that is not strictly after start.
    pub fn new(start: OffsetDateTime, end: Option<OffsetDateTime>) -> Result<Self, TemporalError> {
        if let Some(end) = end {
            if end <= start {
                return Err(TemporalError::InvalidInterval { start, end });
            }
        }
        Ok(Interval { start, end })
    }

    /// Rebuilds an interval from fields that were validated before they were
    /// persisted.
    pub(crate) fn from_stored(start: OffsetDateTime, end: Option<OffsetDateTime>) -> Self {
        Interval { start, end }
    }

    /// An instantaneous record at `at`.
    pub fn point(at: OffsetDateTime) -> Self {
        Interval {
            start: at,
            end: None,
        }
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> Option<OffsetDateTime> {
        self.end
    }

    pub fn is_point(&self) -> bool {
        self.end.is_none()
    }
}

/// Returns `end - start` in whole minutes, or `None` without an end.
///
/// Rounds up: a trailing partial minute counts as a full minute. Truncating
/// would give a sub-minute episode a duration of zero, which the event log
/// refuses (`duration_minutes > 0`), and would under-report every episode
/// that did not end on a minute boundary.
pub fn duration_minutes(
    start: OffsetDateTime,
    end: Option<OffsetDateTime>,
) -> Result<Option<i64>, TemporalError> {
    let Some(end) = end else {
        return Ok(None);
    };
    if end <= start {
        return Err(TemporalError::InvalidInterval { start, end });
    }

    let seconds = (end - start).whole_seconds();
    Ok(Some((seconds + 59) / 60))
}

/// Returns true iff the two spans intersect.
///
/// Two intervals overlap when `[a.start, a.end)` and `[b.start, b.end)` share
/// an instant, so back-to-back records do not conflict. A point overlaps an
/// interval that contains it; two points overlap only when equal.
pub fn overlaps(existing: &Interval, candidate: &Interval) -> bool {
    match (existing.end, candidate.end) {
        (Some(existing_end), Some(candidate_end)) => {
            existing.start < candidate_end && candidate.start < existing_end
        }
        (None, Some(candidate_end)) => {
            candidate.start <= existing.start && existing.start < candidate_end
        }
        (Some(existing_end), None) => {
            existing.start <= candidate.start && candidate.start < existing_end
        }
        (None, None) => existing.start == candidate.start,
    }
}

/// Fails if either end of `interval` is strictly after `now`.
///
/// Both sides are projected into `offset`, the patient-local offset captured
/// with the event, so the verdict never depends on the caller's own zone.
pub fn reject_future_dated(
    interval: &Interval,
    offset: UtcOffset,
    now: OffsetDateTime,
) -> Result<(), TemporalError> {
    let now = now.to_offset(offset);

    let start = interval.start.to_offset(offset);
    if start > now {
        return Err(TemporalError::FutureDate {
            field: TimeField::Start,
            at: start,
            now,
        });
    }

    if let Some(end) = interval.end {
        let end = end.to_offset(offset);
        if end > now {
            return Err(TemporalError::FutureDate {
                field: TimeField::End,
                at: end,
                now,
            });
        }
    }

    Ok(())
}

/// The patient-local calendar date of `at`.
pub fn local_date(at: OffsetDateTime, offset: UtcOffset) -> Date {
    at.to_offset(offset).date()
}
