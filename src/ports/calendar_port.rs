//! Trading calendar port trait.

use chrono::NaiveDate;

pub trait TradingCalendar {
    fn name(&self) -> &str;

    fn is_session(&self, date: NaiveDate) -> bool;

    /// Sessions in `[start, end]`, ascending. Empty when `start > end`.
    fn sessions_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate>;

    /// Number of sessions in `[start, end]`, negated when `end < start`.
    fn session_distance(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        if start <= end {
            self.sessions_in_range(start, end).len() as i64
        } else {
            -(self.sessions_in_range(end, start).len() as i64)
        }
    }
}
