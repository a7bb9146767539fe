//! Chart-ready output of one ticker's run: JSON via serde and a printed summary.

use crate::forecast::ModelSummary;
use crate::models::{DailySentimentRecord, ForecastResult};
use crate::pipeline::{TickerOutcome, TickerRun};
use crate::utils::{fmt_opt, fmt_signed};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// One aligned date with the standardized ratio the sentiment chart plots.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartRow {
    pub date: NaiveDate,
    pub positive_ratio: Option<f64>,
    pub standardized_ratio: Option<f64>,
    pub lagged_positive_ratio: Option<f64>,
    pub pct_change: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastReport {
    pub ticker: String,
    pub generated_at: NaiveDateTime,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub articles: usize,
    pub sentiment_days: usize,
    pub aligned_rows: usize,
    pub correlation: Option<f64>,
    pub sentiment: Vec<DailySentimentRecord>,
    pub chart: Vec<ChartRow>,
    pub forecast: Option<ForecastResult>,
    pub model: Option<ModelSummary>,
}

impl ForecastReport {
    pub fn from_run(run: &TickerRun) -> Self {
        let ratios: Vec<Option<f64>> = run.aligned.iter().map(|r| r.positive_ratio).collect();
        let standardized = standardize(&ratios);

        let chart = run
            .aligned
            .iter()
            .zip(standardized)
            .map(|(row, z)| ChartRow {
                date: row.date,
                positive_ratio: row.positive_ratio,
                standardized_ratio: z,
                lagged_positive_ratio: row.lagged_positive_ratio,
                pct_change: row.pct_change,
            })
            .collect();

        let (forecast, model) = match &run.outcome {
            TickerOutcome::Forecast(f) => (Some(f.result.clone()), Some(f.model.clone())),
            _ => (None, None),
        };

        Self {
            ticker: run.ticker.clone(),
            generated_at: Utc::now().naive_utc(),
            status: run.outcome.label(),
            reason: run.outcome.reason(),
            articles: run.articles,
            sentiment_days: run.sentiment.len(),
            aligned_rows: run.aligned.len(),
            correlation: run.correlation,
            sentiment: run.sentiment.clone(),
            chart,
            forecast,
            model,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialise report")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
        info!("{}: report written to {:?}", self.ticker, path);
        Ok(())
    }

    pub fn print_summary(&self) {
        println!("─────────────────────────────────────────────");
        println!("  {} — sentiment-conditioned forecast", self.ticker);
        println!("─────────────────────────────────────────────");
        println!("  Articles       : {}", self.articles);
        println!("  Sentiment days : {}", self.sentiment_days);
        println!("  Aligned rows   : {}", self.aligned_rows);
        println!("  Correlation r  : {}", fmt_opt(self.correlation, 3));

        if let Some(model) = &self.model {
            println!(
                "  ARIMAX{}  β={:.4}  φ={:.4}  θ={:.4}  σ²={:.4}",
                model.order, model.fit.beta, model.fit.ar, model.fit.ma, model.fit.sigma2
            );
        }

        match &self.forecast {
            Some(res) => {
                println!(
                    "  {:<12} {:>9} {:>9} {:>9}   ({:.0}% band)",
                    "date",
                    "point",
                    "lower",
                    "upper",
                    res.confidence_level * 100.0
                );
                for i in 0..res.horizon() {
                    println!(
                        "  {:<12} {:>9} {:>9} {:>9}",
                        res.forecast_dates[i].to_string(),
                        fmt_signed(res.point_estimates[i]),
                        fmt_signed(res.lower_bound[i]),
                        fmt_signed(res.upper_bound[i]),
                    );
                }
            }
            None => println!(
                "  Status         : {} ({})",
                self.status,
                self.reason.as_deref().unwrap_or("—")
            ),
        }
        println!("─────────────────────────────────────────────");
    }
}

/// One line per ticker for the `batch` command.
pub fn print_batch_table(runs: &[TickerRun]) {
    println!("{:<8} {:<9} {:>5} {:>7} {:>9}  note", "ticker", "status", "rows", "r", "next");
    for run in runs {
        let next = run
            .forecast()
            .and_then(|f| f.result.point_estimates.first().copied())
            .map(fmt_signed)
            .unwrap_or_else(|| "—".into());
        println!(
            "{:<8} {:<9} {:>5} {:>7} {:>9}  {}",
            run.ticker,
            run.outcome.label(),
            run.aligned.len(),
            fmt_opt(run.correlation, 3),
            next,
            run.outcome.reason().unwrap_or_default(),
        );
    }
}

/// `(x - mean) / s` with the sample standard deviation over the defined
/// values. All `None` when fewer than two values or zero spread.
pub fn standardize(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let defined: Vec<f64> = values.iter().flatten().copied().collect();
    let n = defined.len();
    if n < 2 {
        return vec![None; values.len()];
    }

    let mean = defined.iter().sum::<f64>() / n as f64;
    let var = defined.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let sd = var.sqrt();
    if !sd.is_finite() || sd <= 0.0 {
        return vec![None; values.len()];
    }

    values.iter().map(|v| v.map(|x| (x - mean) / sd)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlignedRow;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn test_standardize_uses_sample_std() {
        let z = standardize(&[Some(1.0), None, Some(2.0), Some(3.0)]);
        assert_eq!(z[1], None);
        assert!((z[0].unwrap() + 1.0).abs() < 1e-12);
        assert!(z[2].unwrap().abs() < 1e-12);
        assert!((z[3].unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_standardize_degenerate_inputs() {
        assert_eq!(standardize(&[Some(0.5), Some(0.5)]), vec![None, None]);
        assert_eq!(standardize(&[Some(0.5), None]), vec![None, None]);
        assert!(standardize(&[]).is_empty());
    }

    #[test]
    fn test_skipped_run_report_keeps_partial_outputs() {
        let run = TickerRun {
            ticker: "SBUX".into(),
            started_at: Utc::now().naive_utc(),
            articles: 4,
            sentiment: vec![],
            aligned: vec![
                AlignedRow { date: d(7), positive_ratio: Some(0.4), lagged_positive_ratio: None, pct_change: None },
                AlignedRow { date: d(8), positive_ratio: Some(0.6), lagged_positive_ratio: Some(0.4), pct_change: Some(1.5) },
            ],
            correlation: None,
            outcome: TickerOutcome::Skipped { reason: "no prices".into() },
        };

        let report = ForecastReport::from_run(&run);
        assert_eq!(report.status, "skipped");
        assert_eq!(report.aligned_rows, 2);
        assert!(report.forecast.is_none());
        assert!(report.chart[1].standardized_ratio.unwrap() > 0.0);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["ticker"], "SBUX");
        assert_eq!(json["reason"], "no prices");
        assert_eq!(json["chart"][0]["date"], "2024-03-07");
        assert!(json["forecast"].is_null());
    }

    #[test]
    fn test_forecast_report_json_carries_model_summary() {
        let dir = crate::loader::tests::scratch_dir("report_json");
        crate::pipeline::tests::write_fixture(&dir, "SBUX", 30);
        let source = std::sync::Arc::new(crate::sources::CsvDirectory::new(&dir));
        let pipeline = crate::pipeline::Pipeline::new(
            &crate::config::AppConfig::default(),
            crate::calendar::TradingCalendar::weekends_only(),
            source.clone(),
            source,
        );
        let run = tokio_test::block_on(pipeline.run_ticker("SBUX"));

        let path = dir.join("out").join("SBUX.json");
        ForecastReport::from_run(&run).write_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["status"], "forecast");
        assert_eq!(json["forecast"]["point_estimates"].as_array().unwrap().len(), 3);
        assert_eq!(json["forecast"]["confidence_level"], 0.95);
        assert!(json["model"]["beta"].is_number());
        assert_eq!(json["model"]["order"]["p"], 1);
        assert_eq!(json["model"]["future_exog"].as_array().unwrap().len(), 3);
    }
}
