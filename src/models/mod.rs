use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Article ───────────────────────────────────────────────────────────────────

/// Label assigned to a headline by the external classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
            Self::Neutral => "NEUTRAL",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub title: String,
    pub timestamp: NaiveDateTime,
    pub sentiment: Sentiment,
}

// ── Daily sentiment ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailySentimentRecord {
    pub date: NaiveDate,
    pub positive_count: u32,
    pub negative_count: u32,
    pub rolling_positive_sum: u32,
    pub rolling_negative_sum: u32,
    /// `None` when both rolling sums are zero.
    pub positive_ratio: Option<f64>,
}

// ── Prices ────────────────────────────────────────────────────────────────────

/// Daily close as delivered by a price source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub close: f64,
    /// Percent change versus the previous bar; `None` for the first bar.
    pub pct_change: Option<f64>,
}

// ── Aligned feature table ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignedRow {
    pub date: NaiveDate,
    pub positive_ratio: Option<f64>,
    /// `positive_ratio` of the previous row in the joined, sorted table.
    pub lagged_positive_ratio: Option<f64>,
    pub pct_change: Option<f64>,
}

// ── Forecast output ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastResult {
    pub point_estimates: Vec<f64>,
    pub lower_bound: Vec<f64>,
    pub upper_bound: Vec<f64>,
    pub forecast_dates: Vec<NaiveDate>,
    pub confidence_level: f64,
}

impl ForecastResult {
    pub fn horizon(&self) -> usize {
        self.point_estimates.len()
    }
}

// ── Raw CSV rows ──────────────────────────────────────────────────────────────

/// News CSV: Date, Title, Sentiment
#[derive(Debug, Clone, Default)]
pub struct RawArticleRow {
    pub date: Option<String>,
    pub title: Option<String>,
    pub sentiment: Option<String>,
}

/// investing.com-style price CSV: Date, Price (close), ...
#[derive(Debug, Clone, Default)]
pub struct RawPriceRow {
    pub date: Option<String>,
    pub close: Option<String>,
}
