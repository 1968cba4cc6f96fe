// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

/// Earliest timestamp the service's DataStore id-space could plausibly
/// contain an object (spec.md §4.5 step 3's walk-back floor).
pub fn service_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_nanos(0))
}

/// Steps `from` one calendar month into the past, clamping the day of month
/// when the target month is shorter (e.g. March 31st walks back to the
/// last day of February). Mirrors `archive.py`'s backward time-walk used by
/// the Range Finder (spec.md §4.5 step 3).
pub fn step_back_one_month(from: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if from.month() == 1 {
        (from.year() - 1, 12)
    } else {
        (from.year(), from.month() - 1)
    };

    let days_in_month = days_in_month(year, month);
    let day = from.day().min(days_in_month);

    Utc.with_ymd_and_hms(
        year,
        month,
        day,
        from.hour(),
        from.minute(),
        from.second(),
    )
    .single()
    .unwrap_or(from - Duration::days(28))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month_first = if month == 12 {
        Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
    } else {
        Utc.with_ymd_and_hms(year, month + 1, 1, 0, 0, 0)
    }
    .single();

    let this_month_first = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single();

    match (this_month_first, next_month_first) {
        (Some(this), Some(next)) => (next - this).num_days().max(1) as u32,
        _ => 30,
    }
}

/// Iterator of month-decrement steps starting at `start`, stopping once a
/// step would land before `floor` (spec.md §4.5 step 3: "until … `t <
/// 2012-01-01`").
pub fn month_walk_back(
    start: DateTime<Utc>,
    floor: DateTime<Utc>,
) -> impl Iterator<Item = DateTime<Utc>> {
    std::iter::successors(Some(start), move |t| {
        let next = step_back_one_month(*t);
        (next >= floor).then_some(next)
    })
}

/// Renders a 64-bit title id as the fixed-width uppercase hex string used
/// to key rows in the relational store.
pub fn title_id_hex(title_id: u64) -> String {
    format!("{title_id:016X}")
}
