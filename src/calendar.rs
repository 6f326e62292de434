use crate::config::WeekFlagFallback;
use crate::model::{week_start, PeriodDateRow, SchedulingPeriod, WeekFlags};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySlot {
    pub date: NaiveDate,
    pub week_id: Option<String>,
    /// True when the period had no row for this date and the slot was filled in.
    pub synthetic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarWeek {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub week_id: Option<String>,
    #[serde(flatten)]
    pub flags: WeekFlags,
    pub days: [DaySlot; 7],
}

impl CalendarWeek {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.week_start && date <= self.week_end
    }
}

#[derive(Default)]
struct WindowAcc<'a> {
    week_id: Option<String>,
    open: Option<bool>,
    open_after_close: Option<bool>,
    rows: HashMap<NaiveDate, &'a PeriodDateRow>,
}

fn and_known(acc: Option<bool>, row: Option<bool>) -> Option<bool> {
    match (acc, row) {
        (Some(a), Some(r)) => Some(a && r),
        (None, Some(r)) => Some(r),
        (a, None) => a,
    }
}

/// Groups a period's dated rows into Sunday-anchored weeks of exactly seven
/// days, sorted by start date.
///
/// Flags are a conservative AND over the values actually seen in a window;
/// a window that never saw a flag takes `fallback`.
pub fn build_weeks(rows: &[PeriodDateRow], fallback: WeekFlagFallback) -> Vec<CalendarWeek> {
    let mut windows: BTreeMap<NaiveDate, WindowAcc<'_>> = BTreeMap::new();

    for row in rows {
        let acc = windows.entry(week_start(row.date)).or_default();
        if acc.week_id.is_none() {
            acc.week_id = row.week_id.clone();
        }
        acc.open = and_known(acc.open, row.week_open);
        acc.open_after_close = and_known(acc.open_after_close, row.week_open_after_close);
        acc.rows.entry(row.date).or_insert(row);
    }

    windows
        .into_iter()
        .map(|(start, acc)| {
            let days = std::array::from_fn(|i| {
                let date = start + Duration::days(i as i64);
                match acc.rows.get(&date) {
                    Some(row) => DaySlot {
                        date,
                        week_id: row.week_id.clone().or_else(|| acc.week_id.clone()),
                        synthetic: false,
                    },
                    None => DaySlot {
                        date,
                        week_id: acc.week_id.clone(),
                        synthetic: true,
                    },
                }
            });
            CalendarWeek {
                week_start: start,
                week_end: start + Duration::days(6),
                week_id: acc.week_id,
                flags: WeekFlags {
                    open: fallback.resolve(acc.open),
                    open_after_close: fallback.resolve(acc.open_after_close),
                },
                days,
            }
        })
        .collect()
}

/// A period without a deadline never closes.
pub fn period_closed(period: &SchedulingPeriod, now: DateTime<Utc>) -> bool {
    match period.closes_at {
        Some(closes_at) => now >= closes_at,
        None => false,
    }
}

/// Resolved editability of a week once the period deadline is applied.
pub fn effective_open(flags: WeekFlags, period: &SchedulingPeriod, now: DateTime<Utc>) -> bool {
    if period_closed(period, now) {
        flags.open_after_close
    } else {
        flags.open
    }
}
