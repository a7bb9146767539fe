//! Sentiment-conditioned ARIMAX forecaster.
//!
//! ## Modeling assumption
//!
//! The regressor's future path is not forecast. The last `horizon` observed
//! lagged ratios are replayed as the future exogenous values, i.e. sentiment
//! is assumed roughly persistent over the horizon.

pub mod arimax;
pub mod optimizer;

use self::arimax::ArimaxFit;
use self::optimizer::NelderMead;
use crate::calendar::TradingCalendar;
use crate::config::ForecastConfig;
use crate::error::{CalendarError, FitError};
use crate::models::{AlignedRow, ForecastResult};
use chrono::NaiveDate;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub fn len(&self) -> usize {
        self.p + self.d + self.q
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

/// Fixed model order; not selected from data.
pub const ORDER: ArimaOrder = ArimaOrder { p: 1, d: 1, q: 1 };

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Training rows with undefined lag or target removed, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    pub dates: Vec<NaiveDate>,
    pub endog: Vec<f64>,
    pub exog: Vec<f64>,
}

impl TrainingSet {
    pub fn from_rows(rows: &[AlignedRow]) -> Self {
        let mut set = Self::default();
        for row in rows {
            if let (Some(pct), Some(lagged)) = (row.pct_change, row.lagged_positive_ratio) {
                set.dates.push(row.date);
                set.endog.push(pct);
                set.exog.push(lagged);
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.endog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endog.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub order: ArimaOrder,
    #[serde(flatten)]
    pub fit: ArimaxFit,
    pub future_exog: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub result: ForecastResult,
    pub model: ModelSummary,
}

#[derive(Debug, Clone)]
pub struct ForecastEngine {
    horizon: usize,
    confidence_level: f64,
    optimizer: NelderMead,
    calendar: TradingCalendar,
}

impl ForecastEngine {
    pub fn new(horizon: usize, calendar: TradingCalendar) -> Self {
        Self {
            horizon,
            confidence_level: 0.95,
            optimizer: NelderMead::default(),
            calendar,
        }
    }

    pub fn from_config(cfg: &ForecastConfig, calendar: TradingCalendar) -> Self {
        Self {
            optimizer: NelderMead::new(cfg.max_iterations, cfg.tolerance),
            ..Self::new(cfg.horizon, calendar).with_confidence_level(cfg.confidence_level)
        }
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Smallest training set the engine will fit: the order length plus two,
    /// and never fewer rows than the horizon replays as future regressors.
    pub fn min_observations(&self) -> usize {
        (ORDER.len() + 2).max(self.horizon)
    }

    /// Fit on `rows` and project `horizon` trading days past the last
    /// training date.
    pub fn forecast(&self, rows: &[AlignedRow]) -> Result<Forecast, ForecastError> {
        if self.horizon == 0 {
            return Err(FitError::InvalidParameter {
                name: "horizon".into(),
                reason: "must be at least 1".into(),
            }
            .into());
        }

        let training = TrainingSet::from_rows(rows);
        let required = self.min_observations();
        if training.len() < required {
            return Err(FitError::InsufficientData { required, actual: training.len() }.into());
        }

        let z = self.z_score()?;
        let fit = arimax::fit(&training.endog, &training.exog, &self.optimizer)?;

        let future_exog = training.exog[training.len() - self.horizon..].to_vec();
        let projection = fit.project(&future_exog);

        let last_date = training.dates[training.len() - 1];
        let forecast_dates = self.calendar.next_trading_days(last_date, self.horizon)?;

        let lower_bound = projection
            .mean
            .iter()
            .zip(&projection.std_error)
            .map(|(m, se)| m - z * se)
            .collect();
        let upper_bound = projection
            .mean
            .iter()
            .zip(&projection.std_error)
            .map(|(m, se)| m + z * se)
            .collect();

        info!(
            "ARIMAX{} on {} rows → {} steps from {} (β={:.3})",
            ORDER,
            training.len(),
            self.horizon,
            last_date,
            fit.beta
        );

        Ok(Forecast {
            result: ForecastResult {
                point_estimates: projection.mean,
                lower_bound,
                upper_bound,
                forecast_dates,
                confidence_level: self.confidence_level,
            },
            model: ModelSummary { order: ORDER, fit, future_exog },
        })
    }

    fn z_score(&self) -> Result<f64, FitError> {
        let level = self.confidence_level;
        if !(level > 0.0 && level < 1.0) {
            return Err(FitError::InvalidParameter {
                name: "confidence_level".into(),
                reason: format!("must be in (0, 1), got {level}"),
            });
        }
        let normal = Normal::new(0.0, 1.0).map_err(|e| FitError::InvalidParameter {
            name: "confidence_level".into(),
            reason: e.to_string(),
        })?;
        let z = normal.inverse_cdf(0.5 + level / 2.0);
        debug!("z-score for {:.1}% interval: {:.4}", level * 100.0, z);
        Ok(z)
    }
}
