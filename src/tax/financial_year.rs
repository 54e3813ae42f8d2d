use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

/// Calendar month (1-based) on whose first day a financial year begins.
pub const FINANCIAL_YEAR_START_MONTH: u32 = 7;

/// Financial year (runs 1 July to 30 June)
/// The year value is the calendar year it starts in (e.g., 2021 = 2021/22 financial year)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FinancialYear(pub i32);

impl FinancialYear {
    /// Financial year a date falls in
    pub fn from_date(date: NaiveDate) -> Self {
        let year = date.year();
        if date.month() < FINANCIAL_YEAR_START_MONTH {
            FinancialYear(year - 1)
        } else {
            FinancialYear(year)
        }
    }

    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self::from_date(datetime.date_naive())
    }

    pub fn previous(&self) -> Self {
        FinancialYear(self.0 - 1)
    }

    /// Display as "2021/22" format
    pub fn display(&self) -> String {
        format!("{}/{:02}", self.0, (self.0 + 1).rem_euclid(100))
    }
}

impl std::fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
