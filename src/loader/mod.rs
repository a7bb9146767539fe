//! CSV loaders for pre-classified news and daily price history.

use crate::models::{Article, PriceBar, RawArticleRow, RawPriceRow};
use crate::sources::cleaner::{csv_row_to_article, csv_row_to_bar};
use anyhow::{Context, Result};
use csv::StringRecord;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Position of the first header matching any of `names` (case-insensitive).
fn column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.trim().to_lowercase();
        names.iter().any(|n| h == *n)
    })
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))
}

/// Parse a news CSV with `Date`, `Title` and `Sentiment` columns, in any order.
pub fn load_articles_csv(path: &Path) -> Result<Vec<Article>> {
    let mut reader = reader(path)?;
    let headers = reader.headers()?.clone();

    let date_idx = column(&headers, &["date", "datetime", "timestamp"]).unwrap_or(0);
    let title_idx = column(&headers, &["title", "headline"]).unwrap_or(1);
    let sentiment_idx = column(&headers, &["sentiment", "label"]).unwrap_or(2);

    let mut articles = Vec::new();
    let mut skipped = 0usize;

    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {} in {:?}: {}", i + 1, path, e);
                skipped += 1;
                continue;
            }
        };

        let raw = RawArticleRow {
            date: record.get(date_idx).map(|s| s.to_string()),
            title: record.get(title_idx).map(|s| s.to_string()),
            sentiment: record.get(sentiment_idx).map(|s| s.to_string()),
        };

        match csv_row_to_article(&raw) {
            Some(article) => articles.push(article),
            None => skipped += 1,
        }
    }

    info!("{:?}: {} articles loaded ({} rows skipped)", path, articles.len(), skipped);
    Ok(articles)
}

/// Parse a daily price CSV: investing.com (`Date, Price, ...`) or
/// Yahoo-style (`Date, Open, High, Low, Close, ...`).
pub fn load_prices_csv(symbol: &str, path: &Path) -> Result<Vec<PriceBar>> {
    debug!("Loading {} from {:?}", symbol, path);

    let mut reader = reader(path)?;
    let headers = reader.headers()?.clone();

    let date_idx = column(&headers, &["date"]).unwrap_or(0);
    let close_idx = column(&headers, &["close", "price", "adj close", "last"]).unwrap_or(1);

    let mut bars = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {} in {:?}: {}", i + 1, path, e);
                continue;
            }
        };

        let raw = RawPriceRow {
            date: record.get(date_idx).map(|s| s.to_string()),
            close: record.get(close_idx).map(|s| s.to_string()),
        };

        if let Some(bar) = csv_row_to_bar(symbol, &raw) {
            bars.push(bar);
        }
    }

    info!("{}: {} bars loaded", symbol, bars.len());
    Ok(bars)
}

/// Tickers that have a news file (`<TICKER>_news.csv`) in `dir`.
pub fn discover_tickers(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut tickers = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path: PathBuf = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(stem) = name.strip_suffix("_news.csv") {
            if !stem.is_empty() {
                tickers.push(stem.trim().to_uppercase());
            }
        }
    }
    tickers.sort();
    Ok(tickers)
}
