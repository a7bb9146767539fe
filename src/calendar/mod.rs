//! Trading-day calendar used to date forecast steps.

pub mod holidays;

pub use self::holidays::HolidayLocale;

use crate::config::CalendarConfig;
use crate::error::CalendarError;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Calendar days inspected per requested trading day before giving up.
const SEARCH_DAYS_PER_DATE: usize = 3 * 7;

/// Weekday + holiday-set calendar. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct TradingCalendar {
    locale: HolidayLocale,
    extra: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(locale: HolidayLocale, extra: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            locale,
            extra: extra.into_iter().collect(),
        }
    }

    /// Saturdays and Sundays are the only closures.
    pub fn weekends_only() -> Self {
        Self::new(HolidayLocale::None, [])
    }

    pub fn from_config(cfg: &CalendarConfig) -> Self {
        Self::new(cfg.locale, cfg.extra_holidays.iter().copied())
    }

    pub fn locale(&self) -> HolidayLocale {
        self.locale
    }

    /// Name of the holiday on `date`, if any.
    pub fn holiday_name(&self, date: NaiveDate) -> Option<&'static str> {
        if self.extra.contains(&date) {
            return Some("Custom holiday");
        }
        self.locale.holiday_on(date).map(|h| h.name)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holiday_name(date).is_some()
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// The next `count` trading days strictly after `start`, ascending.
    ///
    /// The walk inspects at most `3 × 7 × count` calendar days; a calendar
    /// that closes nearly every day trips the guard and the dates collected
    /// so far are returned inside [`CalendarError::Overrun`].
    pub fn next_trading_days(
        &self,
        start: NaiveDate,
        count: usize,
    ) -> Result<Vec<NaiveDate>, CalendarError> {
        let mut found = Vec::with_capacity(count);
        if count == 0 {
            return Ok(found);
        }

        let limit = count.saturating_mul(SEARCH_DAYS_PER_DATE);
        let mut current = start;
        let mut iterations = 0usize;

        while found.len() < count {
            if iterations >= limit {
                warn!(
                    "Trading-day search from {} overran after {} days ({} of {} found)",
                    start, iterations, found.len(), count
                );
                return Err(CalendarError::Overrun { requested: count, iterations, found });
            }

            current = match current.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => {
                    return Err(CalendarError::Overrun { requested: count, iterations, found });
                }
            };
            iterations += 1;

            if self.is_trading_day(current) {
                found.push(current);
            }
        }

        debug!("{} trading days after {} ({} calendar days walked)", count, start, iterations);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_weekend_is_not_trading() {
        let cal = TradingCalendar::weekends_only();
        assert!(!cal.is_trading_day(d(2024, 3, 9))); // Saturday
        assert!(!cal.is_trading_day(d(2024, 3, 10))); // Sunday
        assert!(cal.is_trading_day(d(2024, 3, 11)));
    }

    #[test]
    fn test_next_five_without_holidays() {
        let cal = TradingCalendar::weekends_only();
        let start = d(2024, 3, 6); // Wednesday
        let days = cal.next_trading_days(start, 5).unwrap();

        assert_eq!(days.len(), 5);
        assert!(days.iter().all(|x| *x > start));
        assert!(days.windows(2).all(|w| w[0] < w[1]));
        assert!(days.iter().all(|x| !matches!(x.weekday(), Weekday::Sat | Weekday::Sun)));
        assert_eq!(days, vec![d(2024, 3, 7), d(2024, 3, 8), d(2024, 3, 11), d(2024, 3, 12), d(2024, 3, 13)]);
    }

    #[test]
    fn test_friday_rolls_to_monday() {
        let cal = TradingCalendar::weekends_only();
        assert_eq!(cal.next_trading_days(d(2024, 3, 8), 1).unwrap(), vec![d(2024, 3, 11)]);
    }

    #[test]
    fn test_start_date_itself_is_excluded() {
        let cal = TradingCalendar::weekends_only();
        let days = cal.next_trading_days(d(2024, 3, 11), 1).unwrap();
        assert_eq!(days, vec![d(2024, 3, 12)]);
    }

    #[test]
    fn test_us_holiday_is_skipped() {
        let cal = TradingCalendar::new(HolidayLocale::Us, []);
        assert!(!cal.is_trading_day(d(2024, 7, 4)));
        let days = cal.next_trading_days(d(2024, 7, 3), 2).unwrap();
        assert_eq!(days, vec![d(2024, 7, 5), d(2024, 7, 8)]);
    }

    #[test]
    fn test_extra_holidays_are_honoured() {
        let cal = TradingCalendar::new(HolidayLocale::None, [d(2024, 3, 11)]);
        assert_eq!(cal.holiday_name(d(2024, 3, 11)), Some("Custom holiday"));
        assert_eq!(cal.next_trading_days(d(2024, 3, 8), 1).unwrap(), vec![d(2024, 3, 12)]);
    }

    #[test]
    fn test_all_closed_calendar_overruns_instead_of_looping() {
        let start = d(2024, 1, 1);
        let closed = (1..=400).map(|i| start + chrono::Duration::days(i));
        let cal = TradingCalendar::new(HolidayLocale::None, closed);

        match cal.next_trading_days(start, 2) {
            Err(CalendarError::Overrun { requested, iterations, found }) => {
                assert_eq!(requested, 2);
                assert_eq!(iterations, 42);
                assert!(found.is_empty());
            }
            other => panic!("expected overrun, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_count_is_empty() {
        let cal = TradingCalendar::default();
        assert!(cal.next_trading_days(d(2024, 1, 1), 0).unwrap().is_empty());
    }
}
