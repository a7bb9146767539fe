mod alignment;
mod calendar;
mod config;
mod error;
mod forecast;
mod loader;
mod models;
mod pipeline;
mod report;
mod sentiment;
mod sources;
mod storage;
mod utils;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::calendar::{HolidayLocale, TradingCalendar};
use crate::config::AppConfig;
use crate::loader::discover_tickers;
use crate::pipeline::{Pipeline, PipelineStats, TickerOutcome, TickerRun};
use crate::report::ForecastReport;
use crate::sources::{ChartApiSource, CsvDirectory, PriceSource};
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "sentiment-forecast", about = "Sentiment-conditioned ARIMAX price forecasts", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Overrides shared by `forecast` and `batch`.
#[derive(Args, Clone)]
struct RunArgs {
    /// Trading days to forecast
    #[arg(long)]
    horizon: Option<usize>,

    /// Rolling sentiment window, in rows
    #[arg(long)]
    window: Option<usize>,

    /// Holiday calendar for forecast dates
    #[arg(long, value_enum)]
    locale: Option<HolidayLocale>,

    /// Directory holding <TICKER>_news.csv and <TICKER>.csv
    #[arg(short, long, env = "SENTIMENT_DATA_DIR")]
    dir: Option<PathBuf>,

    /// Fetch closes from the chart API instead of <TICKER>.csv
    #[arg(long)]
    http_prices: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Forecast one ticker and print the summary
    Forecast {
        #[arg(short, long)]
        ticker: String,

        #[command(flatten)]
        run: RunArgs,

        /// Write the chart-ready report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Forecast several tickers concurrently (default: every news file in the data dir)
    Batch {
        #[arg(short, long, value_delimiter = ',')]
        tickers: Vec<String>,

        #[command(flatten)]
        run: RunArgs,

        /// Write one JSON report per ticker into this directory
        #[arg(long)]
        json_dir: Option<PathBuf>,
    },

    /// List the next trading days after a date
    Calendar {
        #[arg(long)]
        from: NaiveDate,

        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        #[arg(long, value_enum)]
        locale: Option<HolidayLocale>,
    },

    /// Show recorded forecast runs
    History {
        #[arg(short, long)]
        ticker: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Apply schema migrations to the run log
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "sentiment_forecast=info,warn",
        1 => "sentiment_forecast=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::Forecast { ticker, run, json } => {
            apply_overrides(&mut config, &run)?;
            let _t = utils::Timer::start(format!("Forecast {}", ticker));

            let pipeline = build_pipeline(&config, run.http_prices)?;
            let result = pipeline.run_ticker(&ticker.to_uppercase()).await;
            persist(&config, std::slice::from_ref(&result))?;

            let report = ForecastReport::from_run(&result);
            report.print_summary();
            if let Some(path) = json {
                report.write_json(&path)?;
            }

            if let TickerOutcome::Failed(err) = result.outcome {
                return Err(err.into());
            }
        }

        Command::Batch { tickers, run, json_dir } => {
            apply_overrides(&mut config, &run)?;
            let _t = utils::Timer::start("Batch forecast");

            let tickers: Vec<String> = if tickers.is_empty() {
                discover_tickers(&config.prices.data_dir)?
            } else {
                tickers.iter().map(|t| t.trim().to_uppercase()).filter(|t| !t.is_empty()).collect()
            };
            if tickers.is_empty() {
                println!("No tickers — add <TICKER>_news.csv files to {:?}.", config.prices.data_dir);
                return Ok(());
            }

            let pipeline = build_pipeline(&config, run.http_prices)?;
            let runs = pipeline.run_batch(&tickers).await;
            persist(&config, &runs)?;

            if let Some(dir) = json_dir {
                for r in &runs {
                    ForecastReport::from_run(r).write_json(&dir.join(format!("{}.json", r.ticker)))?;
                }
            }

            report::print_batch_table(&runs);
            let stats = PipelineStats::from_runs(&runs);
            info!(
                "Done: {} tickers, {} forecasts, {} skipped, {} errors",
                stats.tickers_processed, stats.forecasts, stats.skipped, stats.errors
            );
        }

        Command::Calendar { from, count, locale } => {
            let locale = locale.unwrap_or(config.calendar.locale);
            let cal = TradingCalendar::new(locale, config.calendar.extra_holidays.iter().copied());

            let dates = cal.next_trading_days(from, count)?;
            println!("{} trading days after {} ({:?} holidays):", dates.len(), from, cal.locale());

            let mut day = from;
            for date in &dates {
                while let Some(next) = day.succ_opt().filter(|d| d < date) {
                    if let Some(name) = cal.holiday_name(next) {
                        println!("  {}  {}  closed: {}", next, next.format("%a"), name);
                    }
                    day = next;
                }
                println!("  {}  {}", date, date.format("%a"));
                day = *date;
            }
        }

        Command::History { ticker, limit } => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            let ticker = ticker.map(|t| t.to_uppercase());
            let rows = repo.recent_runs(ticker.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No runs recorded — set storage.persist_runs = true and run `sentiment-forecast forecast`.");
            } else {
                println!("{} of {} recorded runs:", rows.len(), repo.run_count()?);
                println!(
                    "{:>5}  {:<19}  {:<8} {:<9} {:>5} {:>7}  {:<10} {:>9}",
                    "id", "started", "ticker", "status", "rows", "r", "next", "point"
                );
                for row in &rows {
                    let (date, point) = match row.next_point {
                        Some((d, p)) => (d.to_string(), utils::fmt_signed(p)),
                        None => ("—".into(), "—".into()),
                    };
                    println!(
                        "{:>5}  {:<19}  {:<8} {:<9} {:>5} {:>7}  {:<10} {:>9}  {}",
                        row.id,
                        row.started_at.format("%Y-%m-%d %H:%M:%S"),
                        row.ticker,
                        row.status,
                        row.aligned_rows,
                        utils::fmt_opt(row.correlation, 3),
                        date,
                        point,
                        row.reason.as_deref().unwrap_or(""),
                    );
                }
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut AppConfig, run: &RunArgs) -> Result<()> {
    if let Some(h) = run.horizon {
        config.forecast.horizon = h;
    }
    if let Some(w) = run.window {
        config.sentiment.window = w;
    }
    if let Some(locale) = run.locale {
        config.calendar.locale = locale;
    }
    if let Some(dir) = &run.dir {
        config.prices.data_dir = dir.clone();
    }
    config.validate()
}

fn build_pipeline(config: &AppConfig, http_prices: bool) -> Result<Pipeline> {
    let csv = Arc::new(CsvDirectory::new(&config.prices.data_dir));
    let prices: Arc<dyn PriceSource> = if http_prices {
        Arc::new(ChartApiSource::new(&config.prices).context("Failed to build price client")?)
    } else {
        csv.clone()
    };
    let calendar = TradingCalendar::from_config(&config.calendar);
    Ok(Pipeline::new(config, calendar, csv, prices))
}

fn persist(config: &AppConfig, runs: &[TickerRun]) -> Result<()> {
    if !config.storage.persist_runs {
        return Ok(());
    }
    let repo = Repository::open(&config.storage.db_path)?;
    repo.run_migrations()?;
    for run in runs {
        if let Err(e) = repo.record_run(run) {
            warn!("{}: could not record run: {:#}", run.ticker, e);
        }
    }
    Ok(())
}
