//! Daily closes from a Yahoo-style `v8/finance/chart` JSON endpoint.

use super::http_client::HttpClient;
use super::PriceSource;
use crate::config::PriceSourceConfig;
use crate::models::PriceBar;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Decode a chart response into daily bars. Null closes are skipped.
pub fn parse_chart_response(body: &str) -> Result<Vec<PriceBar>> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).context("Malformed chart response")?;

    if let Some(err) = envelope.chart.error {
        return Err(anyhow!("chart API error {}: {}", err.code, err.description));
    }

    let result = envelope
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("chart response has no result"))?;

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    if closes.len() != result.timestamp.len() {
        warn!(
            "{:?}: {} timestamps but {} closes",
            result.meta.symbol,
            result.timestamp.len(),
            closes.len()
        );
    }

    let offset = result.meta.gmtoffset;
    let bars = result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(&ts, close)| {
            let close = close.filter(|c| c.is_finite() && *c > 0.0)?;
            let date = DateTime::from_timestamp(ts + offset, 0)?.date_naive();
            Some(PriceBar { date, close })
        })
        .collect();

    Ok(bars)
}

// ── Source ────────────────────────────────────────────────────────────────────

pub struct ChartApiSource {
    client: HttpClient,
    base_url: String,
}

impl ChartApiSource {
    pub fn new(config: &PriceSourceConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.chart_url.trim_end_matches('/').to_string(),
        })
    }

    /// e.g. SBUX, 2024-03-01..2024-03-08 → `<base>/SBUX?period1=…&period2=…&interval=1d`
    fn chart_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid chart URL {}", self.base_url))?;

        url.path_segments_mut()
            .map_err(|_| anyhow!("chart URL cannot take a path: {}", self.base_url))?
            .pop_if_empty()
            .push(&ticker.to_uppercase());

        let period1 = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0);
        // period2 is exclusive; include the whole end day.
        let period2 = end
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t.and_utc().timestamp())
            .unwrap_or(period1);

        url.query_pairs_mut()
            .append_pair("period1", &period1.to_string())
            .append_pair("period2", &period2.to_string())
            .append_pair("interval", "1d");

        Ok(url)
    }
}

#[async_trait]
impl PriceSource for ChartApiSource {
    async fn fetch_price_series(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>> {
        let url = self.chart_url(ticker, start, end)?;
        let body = self
            .client
            .get_text(url.as_str())
            .await
            .with_context(|| format!("Failed to fetch prices for {}", ticker))?;

        let bars: Vec<PriceBar> = parse_chart_response(&body)?
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect();

        debug!("{}: {} daily bars {}..{}", ticker, bars.len(), start, end);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "SBUX", "gmtoffset": -18000},
                "timestamp": [1709821800, 1709908200, 1710163800],
                "indicators": {"quote": [{"close": [90.12, null, 92.5]}]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_response_skips_null_closes() {
        let bars = parse_chart_response(BODY).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(bars[1].close, 92.5);
    }

    #[test]
    fn test_parse_chart_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let err = parse_chart_response(body).unwrap_err();
        assert!(err.to_string().contains("No data found"));
    }

    #[test]
    fn test_chart_url_query() {
        let cfg = PriceSourceConfig::default();
        let src = ChartApiSource::new(&cfg).unwrap();
        let url = src
            .chart_url(
                "sbux",
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            )
            .unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/SBUX");
        let query = url.query().unwrap();
        assert!(query.contains("period1=1709251200"));
        assert!(query.contains("period2=1709942400"));
        assert!(query.contains("interval=1d"));
    }
}
