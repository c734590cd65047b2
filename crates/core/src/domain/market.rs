use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A listed company as seen on the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub symbol: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRow {
    pub company: Company,
    pub change: f64,
    pub change_pct: f64,
    pub growth: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockQuote {
    pub company: Company,
    pub last: f64,
    pub high: f64,
    pub low: f64,
    /// Millions of shares.
    pub volume: f64,
    pub change: f64,
    pub change_pct: f64,
    pub growth: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryPeriod {
    Year,
    Month,
    Day,
    TwoYears,
}

impl HistoryPeriod {
    pub const ALL: [HistoryPeriod; 4] = [
        HistoryPeriod::Year,
        HistoryPeriod::Month,
        HistoryPeriod::Day,
        HistoryPeriod::TwoYears,
    ];

    pub fn range(self) -> &'static str {
        match self {
            HistoryPeriod::Year => "1y",
            HistoryPeriod::Month => "1mo",
            HistoryPeriod::Day => "1d",
            HistoryPeriod::TwoYears => "2y",
        }
    }

    pub fn interval(self) -> &'static str {
        match self {
            HistoryPeriod::Year | HistoryPeriod::TwoYears => "1d",
            HistoryPeriod::Month => "30m",
            HistoryPeriod::Day => "5m",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            HistoryPeriod::Year => "stocks_history",
            HistoryPeriod::Month => "monthly_history",
            HistoryPeriod::Day => "daily_history",
            HistoryPeriod::TwoYears => "analyze_history",
        }
    }
}

impl std::fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HistoryPeriod::Year => "year",
            HistoryPeriod::Month => "month",
            HistoryPeriod::Day => "day",
            HistoryPeriod::TwoYears => "two_years",
        };
        f.write_str(name)
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
