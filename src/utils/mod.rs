use std::time::{Duration, Instant};
use tracing::info;

/// A simple wall-clock timer for logging elapsed time.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "⏱  Finished: {} (took {:.2?})",
            self.label,
            self.elapsed()
        );
    }
}

/// Fixed-precision number, or an em dash placeholder when undefined.
pub fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => "—".to_string(),
    }
}

/// Percent change with an explicit sign, e.g. `+0.42%`.
pub fn fmt_signed(pct: f64) -> String {
    if pct.is_finite() {
        format!("{:+.2}%", pct)
    } else {
        "—".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_opt() {
        assert_eq!(fmt_opt(Some(0.12345), 3), "0.123");
        assert_eq!(fmt_opt(None, 3), "—");
        assert_eq!(fmt_opt(Some(f64::NAN), 2), "—");
    }

    #[test]
    fn test_fmt_signed() {
        assert_eq!(fmt_signed(0.4219), "+0.42%");
        assert_eq!(fmt_signed(-1.5), "-1.50%");
        assert_eq!(fmt_signed(f64::INFINITY), "—");
    }

    #[test]
    fn test_timer_elapsed_grows() {
        let t = Timer::start("test");
        std::thread::sleep(Duration::from_millis(2));
        assert!(t.elapsed() >= Duration::from_millis(2));
    }
}
