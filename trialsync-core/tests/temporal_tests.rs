// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Property tests for the temporal validator.

use std::sync::Arc;

use proptest::prelude::*;
use time::macros::{datetime, offset};
use time::{Duration, OffsetDateTime, UtcOffset};
use trialsync_core::event::{EventDraft, Severity};
use trialsync_core::store::{AppendError, EventStore};
use trialsync_core::temporal::*;

const BASE: OffsetDateTime = datetime!(2026-01-05 00:00 UTC);

fn at(seconds: i64) -> OffsetDateTime {
    BASE + Duration::seconds(seconds)
}

fn interval_strategy() -> impl Strategy<Value = Interval> {
    (0i64..20_000, proptest::option::of(1i64..5_000)).prop_map(|(start, length)| {
        Interval::new(at(start), length.map(|l| at(start + l))).unwrap()
    })
}

/// Start, optional length in seconds, and capture offset in hours.
fn capture_strategy() -> impl Strategy<Value = (i64, Option<i64>, i8)> {
    (
        0i64..20_000,
        proptest::option::of(1i64..5_000),
        -12i8..=14,
    )
}

proptest! {
    #[test]
    fn prop_non_positive_interval_is_invalid(start in 0i64..100_000, back in 0i64..100_000) {
        let result = duration_minutes(at(start), Some(at(start - back)));
        let is_invalid = matches!(result, Err(TemporalError::InvalidInterval { .. }));
        prop_assert!(is_invalid);
        prop_assert!(Interval::new(at(start), Some(at(start - back))).is_err());
    }

    #[test]
    fn prop_duration_is_positive_ceiling(start in 0i64..100_000, length in 1i64..100_000) {
        let minutes = duration_minutes(at(start), Some(at(start + length))).unwrap().unwrap();
        prop_assert!(minutes >= 1);
        prop_assert!(minutes * 60 >= length);
        prop_assert!((minutes - 1) * 60 < length);
    }

    #[test]
    fn prop_overlap_is_symmetric(a in interval_strategy(), b in interval_strategy()) {
        prop_assert_eq!(overlaps(&a, &b), overlaps(&b, &a));
    }

    #[test]
    fn prop_interval_overlaps_itself(a in interval_strategy()) {
        prop_assert!(overlaps(&a, &a));
    }

    #[test]
    fn prop_adjacent_intervals_do_not_overlap(start in 0i64..10_000, l1 in 1i64..5_000, l2 in 1i64..5_000) {
        let first = Interval::new(at(start), Some(at(start + l1))).unwrap();
        let second = Interval::new(at(start + l1), Some(at(start + l1 + l2))).unwrap();
        prop_assert!(!overlaps(&first, &second));
    }

    #[test]
    fn prop_future_check_ignores_viewer_offset(seconds in -3_600i64..3_600, hours in -12i8..=14) {
        let now = at(0);
        let offset = UtcOffset::from_hms(hours, 0, 0).unwrap();
        let start = at(seconds).to_offset(offset);
        let interval = Interval::point(start);

        let in_capture_offset = reject_future_dated(&interval, offset, now).is_ok();
        let seen_from_other_zone = reject_future_dated(&interval, offset, now.to_offset(offset!(-8))).is_ok();
        prop_assert_eq!(in_capture_offset, seconds <= 0);
        prop_assert_eq!(in_capture_offset, seen_from_other_zone);
    }
}

#[test]
fn test_duration_without_end_is_none() {
    assert_eq!(duration_minutes(at(0), None).unwrap(), None);
}

#[test]
fn test_scenario_duration_is_fifteen_minutes() {
    let minutes = duration_minutes(
        datetime!(2026-01-05 08:00 -5),
        Some(datetime!(2026-01-05 08:15 -5)),
    )
    .unwrap();
    assert_eq!(minutes, Some(15));
}

#[test]
fn test_points_overlap_only_when_equal() {
    assert!(overlaps(&Interval::point(at(0)), &Interval::point(at(0))));
    assert!(!overlaps(&Interval::point(at(0)), &Interval::point(at(1))));
}

#[test]
fn test_start_equal_to_now_is_not_future() {
    let now = at(0);
    assert!(reject_future_dated(&Interval::point(now), offset!(-5), now).is_ok());
}

#[test]
fn test_local_date_uses_capture_offset() {
    let instant = datetime!(2026-01-06 02:00 UTC);
    assert_eq!(
        local_date(instant, offset!(-5)),
        datetime!(2026-01-05 00:00 UTC).date()
    );
    assert_eq!(local_date(instant, UtcOffset::UTC), instant.date());
}

proptest! {
    #[test]
    fn prop_append_rejects_exactly_when_overlapping(
        captures in proptest::collection::vec(capture_strategy(), 1..10)
    ) {
        let clock = Arc::new(FixedClock::new(datetime!(2026-01-06 00:00 UTC)));
        let store = EventStore::in_memory(clock).unwrap();
        let mut admitted: Vec<Interval> = Vec::new();

        for (start, length, hours) in captures {
            let offset = UtcOffset::from_hms(hours, 0, 0).unwrap();
            let interval = Interval::new(at(start), length.map(|l| at(start + l))).unwrap();
            let mut draft = EventDraft::recorded("patient-001", "device-aaa", at(start).to_offset(offset))
                .with_severity(Severity::new(3).unwrap());
            if let Some(end) = interval.end() {
                draft = draft.with_end(end.to_offset(offset));
            }

            let expected = admitted.iter().filter(|a| overlaps(a, &interval)).count();
            match store.append(draft) {
                Ok(_) => {
                    prop_assert_eq!(expected, 0);
                    admitted.push(interval);
                }
                Err(AppendError::Overlap { conflict_count, .. }) => {
                    prop_assert_eq!(conflict_count, expected);
                    prop_assert!(expected > 0);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }
    }
}
