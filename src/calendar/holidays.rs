//! Rule-based public holiday tables.
//!
//! Each locale is a set of rules evaluated per year, so no table needs
//! refreshing as time passes. Fixed-date US holidays that land on a weekend
//! are also observed on the nearest weekday (Saturday → Friday, Sunday →
//! Monday); both the actual and the observed date count as holidays.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HolidayLocale {
    /// US federal holidays
    #[default]
    Us,
    /// Indian national holidays (fixed-date gazetted days only)
    India,
    /// Weekends only
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: &'static str,
    pub observed: bool,
}

impl HolidayLocale {
    /// All holidays of this locale falling inside `year`.
    pub fn holidays(self, year: i32) -> Vec<Holiday> {
        match self {
            Self::Us => us_holidays(year),
            Self::India => india_holidays(year),
            Self::None => Vec::new(),
        }
    }

    pub fn holiday_on(self, date: NaiveDate) -> Option<Holiday> {
        self.holidays(date.year()).into_iter().find(|h| h.date == date)
    }
}

// ── US ────────────────────────────────────────────────────────────────────────

fn us_holidays(year: i32) -> Vec<Holiday> {
    let mut out = Vec::with_capacity(16);

    let fixed: [(u32, u32, &'static str, i32); 5] = [
        (1, 1, "New Year's Day", i32::MIN),
        (6, 19, "Juneteenth National Independence Day", 2021),
        (7, 4, "Independence Day", i32::MIN),
        (11, 11, "Veterans Day", i32::MIN),
        (12, 25, "Christmas Day", i32::MIN),
    ];
    for (month, day, name, since) in fixed {
        if year < since {
            continue;
        }
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            push_with_observed(&mut out, date, name);
        }
    }

    // Next year's New Year's Day is observed on Dec 31 when it is a Saturday.
    if let Some(next_ny) = NaiveDate::from_ymd_opt(year + 1, 1, 1) {
        if next_ny.weekday() == Weekday::Sat {
            if let Some(date) = next_ny.pred_opt() {
                out.push(Holiday { date, name: "New Year's Day", observed: true });
            }
        }
    }

    let floating: [(u32, Weekday, Nth, &'static str, i32); 6] = [
        (1, Weekday::Mon, Nth::Third, "Martin Luther King Jr. Day", 1986),
        (2, Weekday::Mon, Nth::Third, "Washington's Birthday", i32::MIN),
        (5, Weekday::Mon, Nth::Last, "Memorial Day", i32::MIN),
        (9, Weekday::Mon, Nth::First, "Labor Day", i32::MIN),
        (10, Weekday::Mon, Nth::Second, "Columbus Day", i32::MIN),
        (11, Weekday::Thu, Nth::Fourth, "Thanksgiving Day", i32::MIN),
    ];
    for (month, weekday, nth, name, since) in floating {
        if year < since {
            continue;
        }
        if let Some(date) = nth_weekday(year, month, weekday, nth) {
            out.push(Holiday { date, name, observed: false });
        }
    }

    // Observed shifts can leave the year (Jan 1 on a Saturday → Dec 31 prior year).
    out.retain(|h| h.date.year() == year);
    out.sort_by_key(|h| h.date);
    out
}

fn push_with_observed(out: &mut Vec<Holiday>, date: NaiveDate, name: &'static str) {
    out.push(Holiday { date, name, observed: false });
    let shifted = match date.weekday() {
        Weekday::Sat => date.checked_sub_days(Days::new(1)),
        Weekday::Sun => date.checked_add_days(Days::new(1)),
        _ => None,
    };
    if let Some(date) = shifted {
        out.push(Holiday { date, name, observed: true });
    }
}

// ── India ─────────────────────────────────────────────────────────────────────

fn india_holidays(year: i32) -> Vec<Holiday> {
    [
        (1, 26, "Republic Day"),
        (8, 15, "Independence Day"),
        (10, 2, "Gandhi Jayanti"),
        (12, 25, "Christmas"),
    ]
    .into_iter()
    .filter_map(|(m, d, name)| {
        NaiveDate::from_ymd_opt(year, m, d).map(|date| Holiday { date, name, observed: false })
    })
    .collect()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Nth {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, nth: Nth) -> Option<NaiveDate> {
    match nth {
        Nth::First => NaiveDate::from_weekday_of_month_opt(year, month, weekday, 1),
        Nth::Second => NaiveDate::from_weekday_of_month_opt(year, month, weekday, 2),
        Nth::Third => NaiveDate::from_weekday_of_month_opt(year, month, weekday, 3),
        Nth::Fourth => NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4),
        Nth::Last => NaiveDate::from_weekday_of_month_opt(year, month, weekday, 5)
            .or_else(|| NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4)),
    }
}
