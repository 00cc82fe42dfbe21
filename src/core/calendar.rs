use std::fmt;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A whole calendar month. Ordering is chronological.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn current() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    fn index(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_index(index: i64) -> Self {
        Self {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn offset(self, months: i64) -> Self {
        Self::from_index(self.index() + months)
    }

    pub fn previous(self) -> Self {
        self.offset(-1)
    }

    /// Whole months from `earlier` to `self`; negative when `earlier` is later.
    pub fn months_since(self, earlier: YearMonth) -> i64 {
        self.index() - earlier.index()
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        self.offset(1)
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    /// Abbreviated month and four-digit year, e.g. `Oct 2026`.
    pub fn label(self) -> String {
        self.first_day().format("%b %Y").to_string()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let parsed = raw.split_once('-').and_then(|(year, month)| {
            let year = year.parse::<i32>().ok()?;
            let month = month.parse::<u32>().ok()?;
            YearMonth::new(year, month)
        });
        parsed.ok_or_else(|| serde::de::Error::custom(format!("invalid year-month: {raw}")))
    }
}

/// The dates between which an instrument pays out. `end == None` is open-ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ActiveWindow {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl ActiveWindow {
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn start_month(self) -> YearMonth {
        YearMonth::from_date(self.start)
    }

    /// Both ends are compared as whole months, inclusive.
    pub fn is_active(self, target: YearMonth) -> bool {
        if self.start > target.last_day() {
            return false;
        }
        match self.end {
            None => true,
            Some(end) => self.start_month() <= target && target <= YearMonth::from_date(end),
        }
    }
}

pub fn is_active(start: NaiveDate, end: Option<NaiveDate>, target: YearMonth) -> bool {
    ActiveWindow::new(start, end).is_active(target)
}
