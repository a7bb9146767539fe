//! Article labels → daily sentiment signal.
//!
//! The whole series is rebuilt from the article list on every call; there is
//! no incremental state to go stale.

use crate::models::{Article, DailySentimentRecord, Sentiment};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

pub const DEFAULT_WINDOW: usize = 7;

#[derive(Debug, Clone)]
pub struct SentimentAggregator {
    window: usize,
}

impl Default for SentimentAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl SentimentAggregator {
    /// `window` counts output rows, not calendar days. Zero is treated as 1.
    pub fn new(window: usize) -> Self {
        Self { window: window.max(1) }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Build one record per date that had at least one non-neutral article,
    /// ordered by date.
    pub fn aggregate(&self, articles: &[Article]) -> Vec<DailySentimentRecord> {
        let mut daily: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();
        let mut neutral = 0usize;

        for article in articles {
            let date = article.timestamp.date();
            match article.sentiment {
                Sentiment::Positive => daily.entry(date).or_default().0 += 1,
                Sentiment::Negative => daily.entry(date).or_default().1 += 1,
                Sentiment::Neutral => neutral += 1,
            }
        }

        let counts: Vec<(NaiveDate, u32, u32)> =
            daily.into_iter().map(|(date, (pos, neg))| (date, pos, neg)).collect();

        let records: Vec<DailySentimentRecord> = counts
            .iter()
            .enumerate()
            .map(|(i, &(date, positive_count, negative_count))| {
                let from = (i + 1).saturating_sub(self.window);
                let (rolling_positive_sum, rolling_negative_sum) = counts[from..=i]
                    .iter()
                    .fold((0u32, 0u32), |(p, n), &(_, pos, neg)| (p + pos, n + neg));

                DailySentimentRecord {
                    date,
                    positive_count,
                    negative_count,
                    rolling_positive_sum,
                    rolling_negative_sum,
                    positive_ratio: ratio(rolling_positive_sum, rolling_negative_sum),
                }
            })
            .collect();

        debug!(
            "Aggregated {} articles ({} neutral dropped) into {} daily records (window {})",
            articles.len(),
            neutral,
            records.len(),
            self.window
        );
        records
    }
}

fn ratio(positive: u32, negative: u32) -> Option<f64> {
    let total = positive + negative;
    if total == 0 {
        None
    } else {
        Some(positive as f64 / total as f64)
    }
}
