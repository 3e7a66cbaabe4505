//! Deciding whether a periodic task should run now.
//!
//! Each periodic schedule defines a *slot*: the latest moment the task was
//! meant to start. A task runs at most once per slot. Success and failure
//! both consume the slot, so failed runs wait for the next one.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::records::RunRecords;
use crate::task::{Schedule, TaskDefinition};

/// Whether `task` should run at `now` given its persisted records.
///
/// `on_demand` and `after_any` tasks are never due here; they run only when
/// triggered or when another task succeeds during a cycle.
pub fn due(task: &TaskDefinition, now: NaiveDateTime, records: &RunRecords) -> bool {
    let Some(slot) = current_slot(task, now) else {
        return false;
    };
    if !task.runs_on(now.weekday()) {
        return false;
    }

    let reached = match task.schedule {
        Schedule::Hourly | Schedule::Monthly => now >= slot,
        Schedule::Daily | Schedule::Weekly => now.time() >= task.time,
        Schedule::OnDemand | Schedule::AfterAny => false,
    };
    if !reached {
        return false;
    }

    let Some(record) = records.get(&task.id) else {
        return true;
    };
    let before_slot = |ts: Option<NaiveDateTime>| ts.is_none_or(|ts| ts < slot);
    before_slot(record.last_success) && before_slot(record.last_attempt)
}

/// Start of the schedule period containing `now`, or `None` for tasks
/// without a periodic schedule.
pub fn current_slot(task: &TaskDefinition, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let today = now.date();
    match task.schedule {
        Schedule::Hourly => {
            let time = NaiveTime::from_hms_opt(now.hour(), task.time.minute(), 0)?;
            Some(today.and_time(time))
        }
        Schedule::Daily => Some(today.and_time(task.time)),
        Schedule::Weekly => {
            let offset = i64::from(today.weekday().num_days_from_monday());
            let monday = today - Duration::days(offset);
            Some(monday.and_time(task.time))
        }
        Schedule::Monthly => {
            let day = task.day_of_month.min(days_in_month(today.year(), today.month()));
            Some(today.with_day(day)?.and_time(task.time))
        }
        Schedule::OnDemand | Schedule::AfterAny => None,
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

#[cfg(test)]
#[path = "due_tests.rs"]
mod tests;
