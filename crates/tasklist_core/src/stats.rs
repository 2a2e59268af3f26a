//! Completion history derived from `completed_at` stamps.

use crate::model::Task;
use time::{Date, Duration, OffsetDateTime, UtcOffset, Weekday};

pub const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCount {
    pub date: Date,
    pub weekday: Weekday,
    pub completed: usize,
}

impl DayCount {
    pub fn short_weekday(&self) -> &'static str {
        match self.weekday {
            Weekday::Monday => "Mon",
            Weekday::Tuesday => "Tue",
            Weekday::Wednesday => "Wed",
            Weekday::Thursday => "Thu",
            Weekday::Friday => "Fri",
            Weekday::Saturday => "Sat",
            Weekday::Sunday => "Sun",
        }
    }
}

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

pub fn local_today(offset: UtcOffset) -> Date {
    OffsetDateTime::now_utc().to_offset(offset).date()
}

/// Completions per local day for the seven days ending on `today`, oldest
/// first. Tasks that are not currently completed do not count.
pub fn weekly_completions(tasks: &[Task], today: Date, offset: UtcOffset) -> Vec<DayCount> {
    let mut days: Vec<DayCount> = (0..WEEK_DAYS)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            DayCount {
                date,
                weekday: date.weekday(),
                completed: 0,
            }
        })
        .collect();

    for task in tasks.iter().filter(|task| task.completed) {
        let Some(completed_date) = task
            .completed_at
            .and_then(|millis| completion_date(millis, offset))
        else {
            continue;
        };

        if let Some(day) = days.iter_mut().find(|day| day.date == completed_date) {
            day.completed += 1;
        }
    }

    days
}

fn completion_date(millis: i64, offset: UtcOffset) -> Option<Date> {
    let nanos = i128::from(millis) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .map(|at| at.to_offset(offset).date())
}

/// Horizontal bar scaled so that `max` fills `width` cells.
pub fn bar(count: usize, max: usize, width: usize) -> String {
    if count == 0 || max == 0 {
        return String::new();
    }

    let cells = (count * width).div_ceil(max).clamp(1, width);
    "#".repeat(cells)
}
