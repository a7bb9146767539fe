//! Joins the daily sentiment signal with price changes and lags the feature.
//!
//! The lag is positional: row `i` receives the ratio of row `i - 1` of the
//! joined, date-sorted table. Weekend and holiday gaps therefore never
//! stretch the lag, and no row ever sees its own day's sentiment.

use crate::models::{AlignedRow, DailySentimentRecord, PriceBar, PriceRecord};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Derive percent changes from daily closes. Input order is not trusted;
/// duplicate dates keep the last bar seen.
pub fn price_records(bars: &[PriceBar]) -> Vec<PriceRecord> {
    let by_date: BTreeMap<NaiveDate, f64> = bars.iter().map(|b| (b.date, b.close)).collect();

    let mut out = Vec::with_capacity(by_date.len());
    let mut prev_close: Option<f64> = None;
    for (date, close) in by_date {
        let pct_change = prev_close
            .filter(|p| *p != 0.0)
            .map(|p| 100.0 * (close - p) / p);
        out.push(PriceRecord { date, close, pct_change });
        prev_close = Some(close);
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct TemporalAligner;

impl TemporalAligner {
    pub fn new() -> Self {
        Self
    }

    /// Inner join on date, sorted ascending, with the one-row lag applied.
    pub fn align(
        &self,
        sentiment: &[DailySentimentRecord],
        prices: &[PriceRecord],
    ) -> Vec<AlignedRow> {
        let price_by_date: HashMap<NaiveDate, Option<f64>> =
            prices.iter().map(|p| (p.date, p.pct_change)).collect();

        let mut joined: Vec<(NaiveDate, Option<f64>, Option<f64>)> = sentiment
            .iter()
            .filter_map(|s| {
                price_by_date
                    .get(&s.date)
                    .map(|pct| (s.date, s.positive_ratio, *pct))
            })
            .collect();
        joined.sort_by_key(|(date, _, _)| *date);
        joined.dedup_by_key(|(date, _, _)| *date);

        let rows: Vec<AlignedRow> = joined
            .iter()
            .enumerate()
            .map(|(i, &(date, positive_ratio, pct_change))| AlignedRow {
                date,
                positive_ratio,
                lagged_positive_ratio: i.checked_sub(1).and_then(|j| joined[j].1),
                pct_change,
            })
            .collect();

        debug!(
            "Aligned {} sentiment days with {} price days → {} rows",
            sentiment.len(),
            prices.len(),
            rows.len()
        );
        rows
    }

    /// Pearson r between the lagged ratio and the price change.
    pub fn correlation(&self, rows: &[AlignedRow]) -> Option<f64> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = rows
            .iter()
            .filter_map(|r| Some((r.lagged_positive_ratio?, r.pct_change?)))
            .unzip();
        pearson(&xs, &ys)
    }
}

/// Population Pearson correlation over paired samples. `None` with fewer than
/// two pairs or when either side has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom <= f64::EPSILON || !denom.is_finite() {
        return None;
    }
    Some((cov / denom).clamp(-1.0, 1.0))
}
