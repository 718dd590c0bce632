//! Report clock and weekly run gate. All times are in the report timezone (UTC+8).

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Timelike, Utc};

use crate::config::schedule::{REPORT_UTC_OFFSET_SECS, RUN_HOUR, RUN_MINUTE, RUN_WEEKDAY};

/// The seven full days covered by a report, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl std::fmt::Display for ReportWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start_date, self.end_date)
    }
}

pub fn report_tz() -> FixedOffset {
    FixedOffset::east_opt(REPORT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current time in the report timezone, truncated to whole seconds.
pub fn report_now() -> DateTime<FixedOffset> {
    let now = Utc::now().with_timezone(&report_tz());
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn should_run_now(now: DateTime<FixedOffset>, force_run: bool) -> bool {
    if force_run {
        return true;
    }
    now.weekday() == RUN_WEEKDAY && now.hour() == RUN_HOUR && now.minute() == RUN_MINUTE
}

/// Window ending yesterday, spanning 7 days.
pub fn report_window(now: DateTime<FixedOffset>) -> ReportWindow {
    let end_date = now.date_naive() - Duration::days(1);
    let start_date = end_date - Duration::days(6);
    ReportWindow { start_date, end_date }
}
