pub mod chart_api;
pub mod cleaner;
pub mod http_client;

use crate::loader::{load_articles_csv, load_prices_csv};
use crate::models::{Article, PriceBar};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::debug;

pub use self::chart_api::ChartApiSource;

// ── Source traits ─────────────────────────────────────────────────────────────

/// Headlines already labelled by the external classifier.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_articles(&self, ticker: &str) -> Result<Vec<Article>>;
}

/// Daily closes; the pipeline derives percent changes itself.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price_series(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>>;
}

// ── CSV directory ─────────────────────────────────────────────────────────────

/// Reads `<dir>/<TICKER>_news.csv` and `<dir>/<TICKER>.csv`.
#[derive(Debug, Clone)]
pub struct CsvDirectory {
    dir: PathBuf,
}

impl CsvDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn news_path(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}_news.csv", cleaner::normalise_symbol(ticker)))
    }

    fn price_path(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", cleaner::normalise_symbol(ticker)))
    }
}

#[async_trait]
impl ArticleSource for CsvDirectory {
    async fn fetch_articles(&self, ticker: &str) -> Result<Vec<Article>> {
        let path = self.news_path(ticker);
        debug!("Reading news for {} from {:?}", ticker, path);
        tokio::task::spawn_blocking(move || load_articles_csv(&path))
            .await
            .context("news loader task failed")?
    }
}

#[async_trait]
impl PriceSource for CsvDirectory {
    async fn fetch_price_series(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let path = self.price_path(ticker);
        let symbol = cleaner::normalise_symbol(ticker);
        let bars = tokio::task::spawn_blocking(move || load_prices_csv(&symbol, &path))
            .await
            .context("price loader task failed")??;

        Ok(bars
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::scratch_dir;
    use std::fs;

    #[test]
    fn test_csv_directory_filters_price_window() {
        let dir = scratch_dir("csv_source");
        fs::write(
            dir.join("SBUX.csv"),
            "Date,Close\n2024-03-06,90\n2024-03-07,91\n2024-03-08,92\n2024-03-11,93\n",
        )
        .unwrap();
        let src = CsvDirectory::new(&dir);

        let start = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let bars = tokio_test::block_on(src.fetch_price_series("sbux", start, end)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, start);
    }

    #[test]
    fn test_missing_news_file_is_an_error() {
        let dir = scratch_dir("csv_source_missing");
        let src = CsvDirectory::new(&dir);
        assert!(tokio_test::block_on(src.fetch_articles("NOPE")).is_err());
    }
}
