//! Reference exchange calendars.
//!
//! - `XNYS`: weekdays minus the NYSE full-day holidays
//! - `WEEKDAYS`: every Monday to Friday

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::domain::error::RunError;
use crate::ports::calendar_port::TradingCalendar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolidayRules {
    None,
    Nyse,
}

#[derive(Debug, Clone)]
pub struct WeekdayCalendar {
    name: String,
    rules: HolidayRules,
}

impl WeekdayCalendar {
    pub fn new(name: impl Into<String>, rules: HolidayRules) -> Self {
        WeekdayCalendar {
            name: name.into(),
            rules,
        }
    }

    pub fn xnys() -> Self {
        Self::new("XNYS", HolidayRules::Nyse)
    }

    pub fn weekdays() -> Self {
        Self::new("WEEKDAYS", HolidayRules::None)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        match self.rules {
            HolidayRules::None => false,
            HolidayRules::Nyse => nyse_holidays(date.year()).contains(&date),
        }
    }
}

impl TradingCalendar for WeekdayCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_session(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    fn sessions_in_range(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_session(*d))
            .collect()
    }
}

/// Look up a calendar by exchange code.
pub fn get_calendar(name: &str) -> Result<Arc<dyn TradingCalendar>, RunError> {
    match name.to_uppercase().as_str() {
        "XNYS" | "NYSE" => Ok(Arc::new(WeekdayCalendar::xnys())),
        "WEEKDAYS" => Ok(Arc::new(WeekdayCalendar::weekdays())),
        other => Err(RunError::ConfigurationConflict {
            message: format!("unknown trading calendar {other:?}"),
        }),
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

/// The `n`th `weekday` of a month, or the last one when `n == 0`.
fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    if n == 0 {
        let next_month = if month == 12 {
            ymd(year + 1, 1, 1)
        } else {
            ymd(year, month + 1, 1)
        }?;
        let mut day = next_month - Duration::days(1);
        while day.weekday() != weekday {
            day -= Duration::days(1);
        }
        return Some(day);
    }
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

/// Saturday holidays move to Friday, Sunday holidays to Monday.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Gregorian Easter Sunday.
fn easter(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    ymd(year, month as u32, day as u32)
}

fn nyse_holidays(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(10);
    // New Year's Day falling on a Saturday is not observed.
    if let Some(new_year) = ymd(year, 1, 1).filter(|d| d.weekday() != Weekday::Sat) {
        days.push(observed(new_year));
    }
    if year >= 1998 {
        days.extend(nth_weekday(year, 1, Weekday::Mon, 3));
    }
    days.extend(nth_weekday(year, 2, Weekday::Mon, 3));
    days.extend(easter(year).map(|e| e - Duration::days(2)));
    days.extend(nth_weekday(year, 5, Weekday::Mon, 0));
    if year >= 2022 {
        days.extend(ymd(year, 6, 19).map(observed));
    }
    days.extend(ymd(year, 7, 4).map(observed));
    days.extend(nth_weekday(year, 9, Weekday::Mon, 1));
    days.extend(nth_weekday(year, 11, Weekday::Thu, 4));
    days.extend(ymd(year, 12, 25).map(observed));
    days
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekends_are_closed() {
        let cal = WeekdayCalendar::weekdays();
        assert!(cal.is_session(day(2024, 1, 5)));
        assert!(!cal.is_session(day(2024, 1, 6)));
        assert!(!cal.is_session(day(2024, 1, 7)));
    }

    #[test]
    fn nyse_holidays_2024() {
        let cal = WeekdayCalendar::xnys();
        for closed in [
            day(2024, 1, 1),
            day(2024, 1, 15),
            day(2024, 2, 19),
            day(2024, 3, 29),
            day(2024, 5, 27),
            day(2024, 6, 19),
            day(2024, 7, 4),
            day(2024, 9, 2),
            day(2024, 11, 28),
            day(2024, 12, 25),
        ] {
            assert!(!cal.is_session(closed), "{closed} should be closed");
        }
        assert!(cal.is_session(day(2024, 7, 5)));
    }

    #[test]
    fn weekend_holidays_are_observed() {
        let cal = WeekdayCalendar::xnys();
        // 2021-07-04 was a Sunday, 2021-12-25 a Saturday.
        assert!(!cal.is_session(day(2021, 7, 5)));
        assert!(!cal.is_session(day(2021, 12, 24)));
        // 2022-01-01 was a Saturday and is not observed on the Friday before.
        assert!(cal.is_session(day(2021, 12, 31)));
    }

    #[test]
    fn easter_dates() {
        assert_eq!(easter(2024), Some(day(2024, 3, 31)));
        assert_eq!(easter(2025), Some(day(2025, 4, 20)));
    }

    #[test]
    fn session_distance_counts_inclusive_sessions() {
        let cal = WeekdayCalendar::xnys();
        assert_eq!(cal.session_distance(day(2024, 1, 8), day(2024, 1, 12)), 5);
        assert_eq!(cal.session_distance(day(2024, 1, 8), day(2024, 1, 8)), 1);
        assert_eq!(cal.session_distance(day(2024, 1, 6), day(2024, 1, 7)), 0);
        assert_eq!(cal.session_distance(day(2024, 1, 12), day(2024, 1, 8)), -5);
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(get_calendar("xnys").unwrap().name(), "XNYS");
        assert_eq!(get_calendar("WEEKDAYS").unwrap().name(), "WEEKDAYS");
        assert!(get_calendar("XLON").is_err());
    }
}
