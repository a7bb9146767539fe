//! Regression with ARIMA(1,1,1) errors and one exogenous regressor.
//!
//! ```text
//! y_t = β·x_t + u_t,    (1 − φL)(1 − L)·u_t = (1 + θL)·ε_t
//! ```
//!
//! After first differencing this is `Δy_t = β·Δx_t + w_t` with `w_t`
//! ARMA(1,1). Parameters are estimated by conditional sum of squares: the
//! innovations are rebuilt recursively from `e_0 = 0` and their squared sum
//! is minimised with Nelder–Mead. `φ` and `θ` are optimised through `tanh` so
//! the fitted model is always stationary and invertible.

use super::optimizer::NelderMead;
use crate::error::FitError;
use serde::Serialize;
use std::f64::consts::PI;
use tracing::debug;

/// Below this, the differenced regressor carries no information about β.
const FLAT_EXOG: f64 = 1e-12;

#[derive(Debug, Clone, Serialize)]
pub struct ArimaxFit {
    pub beta: f64,
    pub ar: f64,
    pub ma: f64,
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub observations: usize,
    pub iterations: usize,
    #[serde(skip)]
    last_level: f64,
    #[serde(skip)]
    last_exog: f64,
    #[serde(skip)]
    last_w: f64,
    #[serde(skip)]
    last_innovation: f64,
}

/// Point forecasts and their standard errors, `steps` long.
#[derive(Debug, Clone)]
pub struct Projection {
    pub mean: Vec<f64>,
    pub std_error: Vec<f64>,
}

/// Fit the model to `endog` with regressor `exog` (same length, index-aligned).
pub fn fit(endog: &[f64], exog: &[f64], optimizer: &NelderMead) -> Result<ArimaxFit, FitError> {
    if endog.len() != exog.len() {
        return Err(FitError::InvalidData(format!(
            "endog has {} values but exog has {}",
            endog.len(),
            exog.len()
        )));
    }
    if endog.iter().chain(exog).any(|v| !v.is_finite()) {
        return Err(FitError::InvalidData("series contains NaN or infinite values".into()));
    }
    // One value is lost to differencing and one to the ARMA recursion; at
    // least one squared innovation must remain.
    if endog.len() < 3 {
        return Err(FitError::InsufficientData { required: 3, actual: endog.len() });
    }

    let dy = difference(endog);
    let dx = difference(exog);

    let sxx: f64 = dx.iter().map(|v| v * v).sum();
    let estimate_beta = sxx > FLAT_EXOG;
    let beta0 = if estimate_beta {
        dx.iter().zip(&dy).map(|(x, y)| x * y).sum::<f64>() / sxx
    } else {
        debug!("Differenced exogenous series is flat; holding β at 0");
        0.0
    };

    let w0: Vec<f64> = dy.iter().zip(&dx).map(|(y, x)| y - beta0 * x).collect();
    let ar0 = lag_one_autocorrelation(&w0).clamp(-0.9, 0.9);

    let unpack = |params: &[f64]| -> (f64, f64, f64) {
        if estimate_beta {
            (params[0], params[1].tanh(), params[2].tanh())
        } else {
            (0.0, params[0].tanh(), params[1].tanh())
        }
    };
    let objective = |params: &[f64]| {
        let (beta, ar, ma) = unpack(params);
        innovations(&dy, &dx, beta, ar, ma).0
    };

    let (start, step) = if estimate_beta {
        (vec![beta0, ar0.atanh(), 0.0], vec![0.5 + 0.1 * beta0.abs(), 0.3, 0.3])
    } else {
        (vec![ar0.atanh(), 0.0], vec![0.3, 0.3])
    };

    let minimum = optimizer.minimize(objective, &start, &step);
    if !minimum.value.is_finite() {
        return Err(FitError::InvalidData("sum of squares is not finite".into()));
    }
    if !minimum.converged {
        return Err(FitError::NotConverged { iterations: minimum.iterations });
    }

    let (beta, ar, ma) = unpack(&minimum.point);
    let (css, last_w, last_innovation, terms) = innovations(&dy, &dx, beta, ar, ma);

    let sigma2 = css / terms as f64;
    let k = terms as f64;
    let log_likelihood = -0.5 * k * ((2.0 * PI * sigma2.max(f64::MIN_POSITIVE)).ln() + 1.0);
    let n_params = if estimate_beta { 4.0 } else { 3.0 };
    let aic = -2.0 * log_likelihood + 2.0 * n_params;

    debug!(
        "ARIMAX(1,1,1) fit: β={:.4} φ={:.4} θ={:.4} σ²={:.4} ({} iterations)",
        beta, ar, ma, sigma2, minimum.iterations
    );

    Ok(ArimaxFit {
        beta,
        ar,
        ma,
        sigma2,
        log_likelihood,
        aic,
        observations: endog.len(),
        iterations: minimum.iterations,
        last_level: endog[endog.len() - 1],
        last_exog: exog[exog.len() - 1],
        last_w,
        last_innovation,
    })
}

impl ArimaxFit {
    /// Project `future_exog.len()` steps ahead given the regressor path.
    pub fn project(&self, future_exog: &[f64]) -> Projection {
        let steps = future_exog.len();
        let mut mean = Vec::with_capacity(steps);

        let mut level = self.last_level;
        let mut prev_exog = self.last_exog;
        let mut w = self.ar * self.last_w + self.ma * self.last_innovation;
        for (h, &x) in future_exog.iter().enumerate() {
            if h > 0 {
                w *= self.ar;
            }
            level += self.beta * (x - prev_exog) + w;
            prev_exog = x;
            mean.push(level);
        }

        let sigma = self.sigma2.max(0.0);
        let mut cumulative = 0.0;
        let std_error = self
            .psi_weights(steps)
            .into_iter()
            .map(|psi| {
                cumulative += psi * psi;
                (sigma * cumulative).sqrt()
            })
            .collect();

        Projection { mean, std_error }
    }

    /// MA(∞) weights of the integrated process, `ψ_0 = 1`.
    fn psi_weights(&self, count: usize) -> Vec<f64> {
        // (1 − φL)(1 − L) = 1 − (1 + φ)L + φL²
        let a1 = 1.0 + self.ar;
        let a2 = -self.ar;
        let mut psi: Vec<f64> = Vec::with_capacity(count);
        for j in 0..count {
            let value = match j {
                0 => 1.0,
                1 => self.ma + a1 * psi[0],
                _ => a1 * psi[j - 1] + a2 * psi[j - 2],
            };
            psi.push(value);
        }
        psi
    }
}

/// Conditional sum of squares and the final recursion state
/// `(css, w_last, e_last, terms)`.
fn innovations(dy: &[f64], dx: &[f64], beta: f64, ar: f64, ma: f64) -> (f64, f64, f64, usize) {
    let mut prev_w = dy[0] - beta * dx[0];
    let mut prev_e = 0.0;
    let mut css = 0.0;

    for (y, x) in dy.iter().zip(dx).skip(1) {
        let w = y - beta * x;
        let e = w - ar * prev_w - ma * prev_e;
        css += e * e;
        prev_w = w;
        prev_e = e;
    }

    (css, prev_w, prev_e, dy.len() - 1)
}

fn difference(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

fn lag_one_autocorrelation(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    if var <= f64::EPSILON {
        return 0.0;
    }
    let cov: f64 = values.windows(2).map(|w| (w[0] - mean) * (w[1] - mean)).sum();
    cov / var
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic standard-normal draws (LCG + Box–Muller).
    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut uniform = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 11) as f64 + 0.5) / (1u64 << 53) as f64
        };
        (0..n)
            .map(|_| {
                let (u1, u2) = (uniform(), uniform());
                (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
            })
            .collect()
    }

    /// y = β·x + u with (1 − φL)Δu = (1 + θL)ε.
    fn simulate(n: usize, beta: f64, ar: f64, ma: f64) -> (Vec<f64>, Vec<f64>) {
        let eps = noise(n, 7);
        let wiggle = noise(n, 11);
        let x: Vec<f64> = (0..n)
            .map(|t| (0.5 + 0.35 * (t as f64 * 0.9).sin() + 0.05 * wiggle[t]).clamp(0.0, 1.0))
            .collect();

        let mut u = vec![0.0; n];
        let mut du_prev = 0.0;
        for t in 1..n {
            let du = ar * du_prev + eps[t] + ma * eps[t - 1];
            u[t] = u[t - 1] + du;
            du_prev = du;
        }
        let y = x.iter().zip(&u).map(|(x, u)| beta * x + u).collect();
        (y, x)
    }

    #[test]
    fn test_recovers_simulated_parameters() {
        let (y, x) = simulate(1000, 2.0, 0.5, 0.3);
        let fit = fit(&y, &x, &NelderMead::default()).unwrap();

        assert!((fit.beta - 2.0).abs() < 0.5, "beta = {}", fit.beta);
        assert!(fit.ar.abs() < 1.0 && fit.ma.abs() < 1.0);
        assert!((fit.sigma2 - 1.0).abs() < 0.3, "sigma2 = {}", fit.sigma2);
        assert_eq!(fit.observations, 1000);
        assert!(fit.aic.is_finite());
    }

    #[test]
    fn test_projection_shapes_and_widening_errors() {
        let (y, x) = simulate(120, 1.0, 0.3, 0.2);
        let fit = fit(&y, &x, &NelderMead::default()).unwrap();
        let p = fit.project(&x[x.len() - 3..]);

        assert_eq!(p.mean.len(), 3);
        assert_eq!(p.std_error.len(), 3);
        assert!(p.mean.iter().all(|v| v.is_finite()));
        assert!(p.std_error.windows(2).all(|w| w[1] >= w[0]));
        assert!(p.std_error[0] > 0.0);
    }

    #[test]
    fn test_first_step_error_is_innovation_sd() {
        let (y, x) = simulate(80, 0.5, 0.1, 0.1);
        let fit = fit(&y, &x, &NelderMead::default()).unwrap();
        let p = fit.project(&[x[x.len() - 1]]);
        assert!((p.std_error[0] - fit.sigma2.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_psi_weights_random_walk_limit() {
        // φ = θ = 0 reduces to a random walk: every ψ is 1.
        let fit = ArimaxFit {
            beta: 0.0,
            ar: 0.0,
            ma: 0.0,
            sigma2: 1.0,
            log_likelihood: 0.0,
            aic: 0.0,
            observations: 10,
            iterations: 0,
            last_level: 0.0,
            last_exog: 0.0,
            last_w: 0.0,
            last_innovation: 0.0,
        };
        assert_eq!(fit.psi_weights(4), vec![1.0, 1.0, 1.0, 1.0]);
        let p = fit.project(&[0.0, 0.0, 0.0, 0.0]);
        assert!((p.std_error[3] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_exogenous_regressor_holds_beta_at_zero() {
        let (y, _) = simulate(60, 0.0, 0.2, 0.1);
        let x = vec![0.6; y.len()];
        let fit = fit(&y, &x, &NelderMead::default()).unwrap();
        assert_eq!(fit.beta, 0.0);
    }

    #[test]
    fn test_exhausted_iterations_are_not_a_fit() {
        let (y, x) = simulate(60, 1.0, 0.3, 0.2);
        let err = fit(&y, &x, &NelderMead::new(1, 1e-14)).unwrap_err();
        assert_eq!(err, FitError::NotConverged { iterations: 1 });
    }

    #[test]
    fn test_rejects_non_finite_and_short_series() {
        let opt = NelderMead::default();
        assert!(matches!(
            fit(&[1.0, f64::NAN, 2.0, 3.0], &[0.1, 0.2, 0.3, 0.4], &opt),
            Err(FitError::InvalidData(_))
        ));
        assert!(matches!(
            fit(&[1.0, 2.0], &[0.1, 0.2], &opt),
            Err(FitError::InsufficientData { required: 3, actual: 2 })
        ));
        assert!(matches!(fit(&[1.0, 2.0, 3.0], &[0.1], &opt), Err(FitError::InvalidData(_))));
    }
}
