//! Error types for one ticker's pipeline run.

use chrono::NaiveDate;
use thiserror::Error;

/// Failures of the trading-day search.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalendarError {
    #[error(
        "trading-day search overran after {iterations} days: found {} of {requested} dates",
        found.len()
    )]
    Overrun {
        requested: usize,
        iterations: usize,
        /// Dates collected before the guard tripped.
        found: Vec<NaiveDate>,
    },
}

/// Failures while fitting or projecting the forecast model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("insufficient data: required {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("optimizer did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
}

/// Stage-level failures surfaced to the caller together with the ticker.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{ticker}: only {rows} usable aligned rows, at least {required} needed to fit")]
    Alignment {
        ticker: String,
        rows: usize,
        required: usize,
    },

    #[error("{ticker}: model fitting failed: {source}")]
    Fitting {
        ticker: String,
        #[source]
        source: FitError,
    },

    #[error("{ticker}: {source}")]
    Calendar {
        ticker: String,
        #[source]
        source: CalendarError,
    },

    #[error("{ticker}: gave up after {secs}s")]
    Timeout { ticker: String, secs: u64 },

    #[error("{ticker}: data source failed: {source:#}")]
    Source {
        ticker: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn ticker(&self) -> &str {
        match self {
            Self::Alignment { ticker, .. }
            | Self::Fitting { ticker, .. }
            | Self::Calendar { ticker, .. }
            | Self::Timeout { ticker, .. }
            | Self::Source { ticker, .. } => ticker,
        }
    }

    /// Short machine-friendly label used in run logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Alignment { .. } => "alignment",
            Self::Fitting { .. } => "fitting",
            Self::Calendar { .. } => "calendar",
            Self::Timeout { .. } => "timeout",
            Self::Source { .. } => "source",
        }
    }
}
