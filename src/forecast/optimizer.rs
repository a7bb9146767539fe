//! Derivative-free Nelder–Mead simplex minimiser.

use tracing::trace;

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct NelderMead {
    pub max_iterations: usize,
    pub tolerance: f64,
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self { max_iterations: 2000, tolerance: 1e-10 }
    }
}

impl NelderMead {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self { max_iterations, tolerance }
    }

    /// Minimise `f` starting from `start`, with initial simplex edges `step`.
    /// Non-finite objective values are treated as +∞.
    pub fn minimize<F>(&self, f: F, start: &[f64], step: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = start.len();
        let eval = |x: &[f64]| {
            let v = f(x);
            if v.is_finite() { v } else { f64::INFINITY }
        };

        if n == 0 {
            return Minimum { point: Vec::new(), value: eval(start), iterations: 0, converged: true };
        }

        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        simplex.push((start.to_vec(), eval(start)));
        for i in 0..n {
            let mut p = start.to_vec();
            p[i] += step.get(i).copied().unwrap_or(0.1);
            let v = eval(&p);
            simplex.push((p, v));
        }

        let mut iterations = 0usize;
        let mut converged = false;

        while iterations < self.max_iterations {
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

            let best = simplex[0].1;
            let worst = simplex[n].1;
            let flat = (worst - best).abs() <= self.tolerance * (1.0 + best.abs());
            let collapsed = simplex[1..].iter().all(|(p, _)| {
                p.iter().zip(&simplex[0].0).all(|(a, b)| (a - b).abs() <= self.tolerance.sqrt())
            });
            if best.is_finite() && (flat || collapsed) {
                converged = true;
                break;
            }
            iterations += 1;

            let centroid: Vec<f64> = (0..n)
                .map(|j| simplex[..n].iter().map(|(p, _)| p[j]).sum::<f64>() / n as f64)
                .collect();
            let toward = |coef: f64| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(&simplex[n].0)
                    .map(|(c, w)| c + coef * (c - w))
                    .collect()
            };

            let reflected = toward(REFLECT);
            let f_reflected = eval(&reflected);

            if f_reflected < simplex[0].1 {
                let expanded = toward(EXPAND);
                let f_expanded = eval(&expanded);
                simplex[n] = if f_expanded < f_reflected {
                    (expanded, f_expanded)
                } else {
                    (reflected, f_reflected)
                };
                continue;
            }

            if f_reflected < simplex[n - 1].1 {
                simplex[n] = (reflected, f_reflected);
                continue;
            }

            let contracted = if f_reflected < simplex[n].1 {
                toward(CONTRACT)
            } else {
                toward(-CONTRACT)
            };
            let f_contracted = eval(&contracted);
            if f_contracted < simplex[n].1.min(f_reflected) {
                simplex[n] = (contracted, f_contracted);
                continue;
            }

            let best_point = simplex[0].0.clone();
            for (p, v) in simplex.iter_mut().skip(1) {
                for (x, b) in p.iter_mut().zip(&best_point) {
                    *x = b + SHRINK * (*x - b);
                }
                *v = eval(&p[..]);
            }
        }

        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (point, value) = simplex.swap_remove(0);
        trace!("Nelder-Mead: {} iterations, f = {:.6e}, converged = {}", iterations, value, converged);

        Minimum { point, value, iterations, converged }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_bowl() {
        let f = |x: &[f64]| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2);
        let m = NelderMead::default().minimize(f, &[0.0, 0.0], &[0.5, 0.5]);
        assert!(m.converged);
        assert!((m.point[0] - 3.0).abs() < 1e-3);
        assert!((m.point[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_rosenbrock() {
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let m = NelderMead::new(5000, 1e-14).minimize(f, &[-1.2, 1.0], &[0.1, 0.1]);
        assert!((m.point[0] - 1.0).abs() < 1e-2, "{:?}", m.point);
        assert!((m.point[1] - 1.0).abs() < 2e-2, "{:?}", m.point);
    }

    #[test]
    fn test_iteration_budget_is_respected() {
        let f = |x: &[f64]| (x[0] - 100.0).powi(2);
        let m = NelderMead::new(3, 1e-14).minimize(f, &[0.0], &[0.001]);
        assert!(!m.converged);
        assert_eq!(m.iterations, 3);
    }

    #[test]
    fn test_non_finite_regions_are_avoided() {
        let f = |x: &[f64]| if x[0] < 0.0 { f64::NAN } else { (x[0] - 0.5).powi(2) };
        let m = NelderMead::default().minimize(f, &[0.1], &[0.2]);
        assert!((m.point[0] - 0.5).abs() < 1e-3);
    }
}
