//! Pipeline orchestrator: sources → sentiment → alignment → forecast.
//!
//! ## Per-ticker run
//!
//!   1. Fetch classified articles, aggregate into the daily sentiment signal
//!   2. Fetch daily closes between the first and last article date
//!   3. Join on date, lag the ratio by one row, compute the correlation
//!   4. Fit ARIMAX(1,1,1) on the blocking pool and project the horizon
//!
//! Empty inputs end the run as `Skipped`. Any other failure is recorded on
//! that ticker's `TickerRun`; the aggregation and alignment outputs produced
//! before it are kept. Nothing is cached between runs.
//!
//! `run_batch()` processes tickers concurrently (bounded by a semaphore); one
//! ticker failing never aborts the rest.

use crate::alignment::{price_records, TemporalAligner};
use crate::calendar::TradingCalendar;
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::forecast::{Forecast, ForecastEngine, ForecastError, TrainingSet};
use crate::models::{AlignedRow, DailySentimentRecord};
use crate::sentiment::SentimentAggregator;
use crate::sources::{ArticleSource, PriceSource};
use anyhow::anyhow;
use chrono::{NaiveDateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum TickerOutcome {
    Forecast(Box<Forecast>),
    /// No articles, no prices, or no overlapping dates.
    Skipped { reason: String },
    Failed(PipelineError),
}

impl TickerOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Forecast(_) => "forecast",
            Self::Skipped { .. } => "skipped",
            Self::Failed(_) => "error",
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Forecast(_) => None,
            Self::Skipped { reason } => Some(reason.clone()),
            Self::Failed(err) => Some(err.to_string()),
        }
    }
}

/// Everything one ticker's run produced, including partial results.
#[derive(Debug)]
pub struct TickerRun {
    pub ticker: String,
    pub started_at: NaiveDateTime,
    pub articles: usize,
    pub sentiment: Vec<DailySentimentRecord>,
    pub aligned: Vec<AlignedRow>,
    pub correlation: Option<f64>,
    pub outcome: TickerOutcome,
}

impl TickerRun {
    fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            started_at: Utc::now().naive_utc(),
            articles: 0,
            sentiment: Vec::new(),
            aligned: Vec::new(),
            correlation: None,
            outcome: TickerOutcome::Skipped { reason: "not started".into() },
        }
    }

    fn skip(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        info!("{}: skipped ({})", self.ticker, reason);
        self.outcome = TickerOutcome::Skipped { reason };
        self
    }

    fn fail(mut self, err: PipelineError) -> Self {
        warn!("{:#}", err);
        self.outcome = TickerOutcome::Failed(err);
        self
    }

    pub fn forecast(&self) -> Option<&Forecast> {
        match &self.outcome {
            TickerOutcome::Forecast(f) => Some(f),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub tickers_processed: usize,
    pub forecasts: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl PipelineStats {
    pub fn from_runs(runs: &[TickerRun]) -> Self {
        runs.iter().fold(
            Self { tickers_processed: runs.len(), ..Self::default() },
            |mut s, run| {
                match run.outcome {
                    TickerOutcome::Forecast(_) => s.forecasts += 1,
                    TickerOutcome::Skipped { .. } => s.skipped += 1,
                    TickerOutcome::Failed(_) => s.errors += 1,
                }
                s
            },
        )
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Pipeline {
    aggregator: SentimentAggregator,
    aligner: TemporalAligner,
    engine: ForecastEngine,
    articles: Arc<dyn ArticleSource>,
    prices: Arc<dyn PriceSource>,
    concurrency: usize,
    timeout_secs: u64,
}

impl Pipeline {
    pub fn new(
        config: &AppConfig,
        calendar: TradingCalendar,
        articles: Arc<dyn ArticleSource>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        let aggregator = SentimentAggregator::new(config.sentiment.window);
        let engine = ForecastEngine::from_config(&config.forecast, calendar);
        debug!(
            "Pipeline: window {} rows, horizon {} days, min {} training rows",
            aggregator.window(),
            engine.horizon(),
            engine.min_observations()
        );

        Self {
            aggregator,
            aligner: TemporalAligner::new(),
            engine,
            articles,
            prices,
            concurrency: config.pipeline.concurrency.max(1),
            timeout_secs: config.pipeline.timeout_secs,
        }
    }

    /// Run one ticker end to end, bounded by `pipeline.timeout_secs` when set.
    pub async fn run_ticker(&self, ticker: &str) -> TickerRun {
        if self.timeout_secs == 0 {
            return self.run_stages(ticker).await;
        }

        let budget = Duration::from_secs(self.timeout_secs);
        match tokio::time::timeout(budget, self.run_stages(ticker)).await {
            Ok(run) => run,
            Err(_) => TickerRun::new(ticker).fail(PipelineError::Timeout {
                ticker: ticker.to_string(),
                secs: self.timeout_secs,
            }),
        }
    }

    async fn run_stages(&self, ticker: &str) -> TickerRun {
        let mut run = TickerRun::new(ticker);

        // ── 1. Articles → daily sentiment ─────────────────────────────────────
        let articles = match self.articles.fetch_articles(ticker).await {
            Ok(a) => a,
            Err(e) => return run.fail(source_error(ticker, e)),
        };
        run.articles = articles.len();
        if articles.is_empty() {
            return run.skip("no articles");
        }

        run.sentiment = self.aggregator.aggregate(&articles);
        if run.sentiment.is_empty() {
            return run.skip("no positive or negative articles");
        }

        // ── 2. Prices over the article window ─────────────────────────────────
        let dates = articles.iter().map(|a| a.timestamp.date());
        let (Some(start), Some(end)) = (dates.clone().min(), dates.max()) else {
            return run.skip("no articles");
        };

        let bars = match self.prices.fetch_price_series(ticker, start, end).await {
            Ok(b) => b,
            Err(e) => return run.fail(source_error(ticker, e)),
        };
        if bars.is_empty() {
            return run.skip(format!("no prices between {} and {}", start, end));
        }

        // ── 3. Join + lag ─────────────────────────────────────────────────────
        let prices = price_records(&bars);
        run.aligned = self.aligner.align(&run.sentiment, &prices);
        if run.aligned.is_empty() {
            return run.skip("no overlapping dates");
        }
        run.correlation = self.aligner.correlation(&run.aligned);

        let usable = TrainingSet::from_rows(&run.aligned).len();
        let required = self.engine.min_observations();
        if usable < required {
            return run.fail(PipelineError::Alignment {
                ticker: ticker.to_string(),
                rows: usable,
                required,
            });
        }

        // ── 4. Fit + project ──────────────────────────────────────────────────
        let engine = self.engine.clone();
        let rows = run.aligned.clone();
        let fitted = tokio::task::spawn_blocking(move || engine.forecast(&rows)).await;

        run.outcome = match fitted {
            Ok(Ok(forecast)) => {
                info!(
                    "{}: {} articles, {} rows, r={} → {} steps",
                    ticker,
                    run.articles,
                    run.aligned.len(),
                    run.correlation.map_or("n/a".to_string(), |r| format!("{:.3}", r)),
                    forecast.result.horizon()
                );
                TickerOutcome::Forecast(Box::new(forecast))
            }
            Ok(Err(ForecastError::Fit(source))) => {
                return run.fail(PipelineError::Fitting { ticker: ticker.to_string(), source });
            }
            Ok(Err(ForecastError::Calendar(source))) => {
                return run.fail(PipelineError::Calendar { ticker: ticker.to_string(), source });
            }
            Err(e) => {
                error!("Fit task panic for {}: {}", ticker, e);
                return run.fail(source_error(ticker, anyhow!("fit task failed: {}", e)));
            }
        };
        run
    }

    /// Run every ticker concurrently, at most `pipeline.concurrency` at once.
    /// Results come back in input order.
    pub async fn run_batch(&self, tickers: &[String]) -> Vec<TickerRun> {
        info!("=== Batch: {} tickers (concurrency {}) ===", tickers.len(), self.concurrency);

        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();

        for ticker in tickers {
            let ticker = ticker.clone();
            let pipeline = self.clone();
            let sem = Arc::clone(&sem);

            let task_ticker = ticker.clone();
            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await.ok();
                pipeline.run_ticker(&task_ticker).await
            });

            handles.push((ticker, handle));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for (ticker, handle) in handles {
            match handle.await {
                Ok(run) => runs.push(run),
                Err(e) => {
                    error!("Task panic for {}: {}", ticker, e);
                    runs.push(
                        TickerRun::new(&ticker)
                            .fail(source_error(&ticker, anyhow!("task panicked: {}", e))),
                    );
                }
            }
        }

        let stats = PipelineStats::from_runs(&runs);
        info!(
            "=== Done: {} tickers | {} forecasts | {} skipped | {} errors ===",
            stats.tickers_processed, stats.forecasts, stats.skipped, stats.errors
        );
        runs
    }
}

fn source_error(ticker: &str, source: anyhow::Error) -> PipelineError {
    PipelineError::Source { ticker: ticker.to_string(), source }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::loader::tests::scratch_dir;
    use crate::sources::CsvDirectory;
    use chrono::NaiveDate;
    use std::fmt::Write as _;
    use std::fs;
    use std::path::Path;

    /// Writes `<T>_news.csv` and `<T>.csv` covering `days` weekdays from
    /// 2024-01-02, with a sentiment mix and closes that vary day to day.
    pub(crate) fn write_fixture(dir: &Path, ticker: &str, days: usize) {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut dates = vec![start];
        dates.extend(TradingCalendar::weekends_only().next_trading_days(start, days - 1).unwrap());

        let mut news = String::from("Date,Title,Sentiment\n");
        let mut prices = String::from("Date,Close\n");
        let mut close = 100.0_f64;
        for (i, date) in dates.iter().enumerate() {
            for k in 0..(1 + i % 3) {
                writeln!(news, "{} 09:0{}:00,up move {},POSITIVE", date, k, k).unwrap();
            }
            for k in 0..(1 + i % 2) {
                writeln!(news, "{} 14:0{}:00,down move {},NEGATIVE", date, k, k).unwrap();
            }
            writeln!(news, "{} 16:00:00,market wrap,NEUTRAL", date).unwrap();

            close *= 1.0 + 0.01 * ((i as f64) * 1.3).sin() + 0.002 * (i % 3) as f64;
            writeln!(prices, "{},{:.4}", date, close).unwrap();
        }
        fs::write(dir.join(format!("{}_news.csv", ticker)), news).unwrap();
        fs::write(dir.join(format!("{}.csv", ticker)), prices).unwrap();
    }

    fn pipeline(dir: &Path) -> Pipeline {
        let source = Arc::new(CsvDirectory::new(dir));
        Pipeline::new(
            &AppConfig::default(),
            TradingCalendar::weekends_only(),
            source.clone(),
            source,
        )
    }

    #[test]
    fn test_end_to_end_forecast_from_csv() {
        let dir = scratch_dir("pipeline_e2e");
        write_fixture(&dir, "SBUX", 40);

        let run = tokio_test::block_on(pipeline(&dir).run_ticker("SBUX"));
        assert_eq!(run.articles, 40 + (0..40).map(|i| 2 + i % 3 + i % 2).sum::<usize>());
        assert_eq!(run.sentiment.len(), 40);
        assert_eq!(run.aligned.len(), 40);
        assert!(run.correlation.is_some());

        let forecast = run.forecast().expect("forecast outcome");
        assert_eq!(forecast.result.horizon(), 3);
        assert!(forecast.result.forecast_dates[0] > run.aligned.last().unwrap().date);
    }

    #[test]
    fn test_two_aligned_rows_fail_alignment_but_keep_outputs() {
        let dir = scratch_dir("pipeline_two_rows");
        write_fixture(&dir, "TINY", 2);

        let run = tokio_test::block_on(pipeline(&dir).run_ticker("TINY"));
        assert_eq!(run.aligned.len(), 2);
        assert_eq!(run.sentiment.len(), 2);
        match &run.outcome {
            TickerOutcome::Failed(PipelineError::Alignment { ticker, rows, required }) => {
                assert_eq!(ticker, "TINY");
                assert_eq!((*rows, *required), (1, 5));
            }
            other => panic!("expected alignment error, got {:?}", other),
        }
    }

    #[test]
    fn test_alignment_error_covers_every_short_join() {
        let dir = scratch_dir("pipeline_short_joins");
        for days in [1, 3, 5] {
            let ticker = format!("SHORT{}", days);
            write_fixture(&dir, &ticker, days);

            let run = tokio_test::block_on(pipeline(&dir).run_ticker(&ticker));
            assert_eq!(run.aligned.len(), days);
            match &run.outcome {
                TickerOutcome::Failed(PipelineError::Alignment { rows, required, .. }) => {
                    // The first row has neither a lag nor a price change.
                    assert_eq!(*rows, days - 1);
                    assert_eq!(*required, 5);
                }
                other => panic!("{} days: expected alignment error, got {:?}", days, other),
            }
        }
    }

    /// Never answers within the per-ticker budget.
    struct StalledArticles;

    #[async_trait::async_trait]
    impl ArticleSource for StalledArticles {
        async fn fetch_articles(&self, _ticker: &str) -> anyhow::Result<Vec<crate::models::Article>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![])
        }
    }

    #[test]
    fn test_slow_source_times_out() {
        let mut config = AppConfig::default();
        config.pipeline.timeout_secs = 1;
        let prices = Arc::new(CsvDirectory::new(scratch_dir("pipeline_timeout")));
        let pipeline = Pipeline::new(
            &config,
            TradingCalendar::weekends_only(),
            Arc::new(StalledArticles),
            prices,
        );

        let run = tokio_test::block_on(pipeline.run_ticker("SLOW"));
        match &run.outcome {
            TickerOutcome::Failed(err @ PipelineError::Timeout { secs, .. }) => {
                assert_eq!(*secs, 1);
                assert_eq!(err.kind(), "timeout");
                assert_eq!(err.ticker(), "SLOW");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_news_is_skipped() {
        let dir = scratch_dir("pipeline_empty");
        fs::write(dir.join("EMPTY_news.csv"), "Date,Title,Sentiment\n").unwrap();

        let run = tokio_test::block_on(pipeline(&dir).run_ticker("EMPTY"));
        assert_eq!(run.outcome.label(), "skipped");
        assert_eq!(run.outcome.reason().as_deref(), Some("no articles"));
    }

    #[test]
    fn test_no_overlapping_dates_is_skipped() {
        let dir = scratch_dir("pipeline_no_overlap");
        fs::write(
            dir.join("GAP_news.csv"),
            "Date,Title,Sentiment\n2024-01-02,a,POSITIVE\n2024-01-04,b,NEGATIVE\n",
        )
        .unwrap();
        fs::write(dir.join("GAP.csv"), "Date,Close\n2024-01-03,10\n").unwrap();

        let run = tokio_test::block_on(pipeline(&dir).run_ticker("GAP"));
        assert!(run.aligned.is_empty());
        assert_eq!(run.outcome.reason().as_deref(), Some("no overlapping dates"));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let dir = scratch_dir("pipeline_batch");
        write_fixture(&dir, "GOOD", 30);
        write_fixture(&dir, "TINY", 2);

        let tickers = vec!["GOOD".to_string(), "MISSING".to_string(), "TINY".to_string()];
        let runs = tokio_test::block_on(pipeline(&dir).run_batch(&tickers));

        assert_eq!(runs.iter().map(|r| r.ticker.as_str()).collect::<Vec<_>>(), tickers);
        assert_eq!(runs[0].outcome.label(), "forecast");
        assert!(matches!(runs[1].outcome, TickerOutcome::Failed(PipelineError::Source { .. })));
        assert!(matches!(runs[2].outcome, TickerOutcome::Failed(PipelineError::Alignment { .. })));

        let stats = PipelineStats::from_runs(&runs);
        assert_eq!(stats, PipelineStats { tickers_processed: 3, forecasts: 1, skipped: 0, errors: 2 });
    }
}
