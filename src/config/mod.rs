use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::calendar::HolidayLocale;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sentiment: SentimentConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub prices: PriceSourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Daily sentiment aggregation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SentimentConfig {
    /// Rolling window, in output rows
    #[serde(default = "default_window")]
    pub window: usize,
}

/// ARIMAX fit and projection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForecastConfig {
    #[serde(default = "default_horizon")]
    pub horizon: usize,

    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

/// Holiday calendar used for forecast dates
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub locale: HolidayLocale,

    /// Additional closures on top of the locale rules
    #[serde(default)]
    pub extra_holidays: Vec<NaiveDate>,
}

/// Where articles and prices come from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PriceSourceConfig {
    /// Directory holding `<TICKER>.csv` and `<TICKER>_news.csv`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_chart_url")]
    pub chart_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub persist_runs: bool,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Wall-clock budget per ticker; 0 disables the timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_window() -> usize {
    crate::sentiment::DEFAULT_WINDOW
}
fn default_horizon() -> usize {
    3
}
fn default_confidence_level() -> f64 {
    0.95
}
fn default_max_iterations() -> usize {
    2000
}
fn default_tolerance() -> f64 {
    1e-10
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_chart_url() -> String {
    "https://query1.finance.yahoo.com/v8/finance/chart".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_max_retries() -> usize {
    3
}
fn default_user_agent() -> String {
    "sentiment-forecast/0.1 (research project; sentiment-conditioned forecasting)".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/forecasts.duckdb")
}
fn default_concurrency() -> usize {
    4
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self { window: default_window() }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            confidence_level: default_confidence_level(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            locale: HolidayLocale::default(),
            extra_holidays: Vec::new(),
        }
    }
}

impl Default for PriceSourceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            chart_url: default_chart_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            persist_runs: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("SENTIMENT").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sentiment.window == 0 {
            anyhow::bail!("sentiment.window must be at least 1");
        }
        if self.forecast.horizon == 0 {
            anyhow::bail!("forecast.horizon must be at least 1");
        }
        if !(self.forecast.confidence_level > 0.0 && self.forecast.confidence_level < 1.0) {
            anyhow::bail!(
                "forecast.confidence_level must be in (0, 1), got {}",
                self.forecast.confidence_level
            );
        }
        if self.pipeline.concurrency == 0 {
            anyhow::bail!("pipeline.concurrency must be at least 1");
        }
        Ok(())
    }
}
