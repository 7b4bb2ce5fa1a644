//! Result aggregation
//!
//! Both reductions are order-insensitive, so results can arrive from workers
//! in any order.

use std::fmt;
use std::time::Duration;

use hdrhistogram::Histogram;

use crate::core::locations::format_number;

/// Mean and sample standard deviation of a set of distances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `0` for a single value
    pub stddev: f64,
}

/// Prints `<mean> +/- <stddev> meters` with the mean rounded to 3 decimals
/// and the deviation to 2, without trailing zeros (`150.0 +/- 70.71`).
/// A single value has no deviation and prints `0`.
impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mean = format_number(round_to(self.mean, 3));
        if self.count > 1 {
            let stddev = format_number(round_to(self.stddev, 2));
            write!(f, "{mean} +/- {stddev} meters")
        } else {
            write!(f, "{mean} +/- 0 meters")
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Summarize the present values, ignoring absent ones
///
/// Returns `None` when nothing is left to summarize.
pub fn summarize<I>(results: I) -> Option<Summary>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let values: Vec<f64> = results.into_iter().flatten().collect();
    let count = values.len();
    if count == 0 {
        return None;
    }

    let mean = values.iter().sum::<f64>() / count as f64;
    let stddev = if count > 1 {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    Some(Summary {
        count,
        mean,
        stddev,
    })
}

/// Latency distribution of a run, recorded in microseconds
pub struct LatencyStats {
    histogram: Histogram<u64>,
    failed: u64,
    unroutable: u64,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            // Auto-resizing, so recording never fails on outliers
            histogram: Histogram::new(3).expect("Failed to create latency histogram"),
            failed: 0,
            unroutable: 0,
        }
    }

    pub fn record(&mut self, latency: Duration) {
        let micros = latency.as_micros().min(u64::MAX as u128) as u64;
        self.histogram.saturating_record(micros.max(1));
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn record_unroutable(&mut self) {
        self.unroutable += 1;
    }

    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn unroutable(&self) -> u64 {
        self.unroutable
    }

    /// Latency at `quantile` (0.0..=1.0) in milliseconds
    pub fn quantile_ms(&self, quantile: f64) -> f64 {
        self.histogram.value_at_quantile(quantile) as f64 / 1000.0
    }

    pub fn mean_ms(&self) -> f64 {
        self.histogram.mean() / 1000.0
    }

    pub fn min_ms(&self) -> f64 {
        self.histogram.min() as f64 / 1000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.histogram.max() as f64 / 1000.0
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count() == 0 {
            return write!(f, "no requests recorded");
        }
        write!(
            f,
            "min {:.2} ms, mean {:.2} ms, p50 {:.2} ms, p90 {:.2} ms, p99 {:.2} ms, max {:.2} ms",
            self.min_ms(),
            self.mean_ms(),
            self.quantile_ms(0.50),
            self.quantile_ms(0.90),
            self.quantile_ms(0.99),
            self.max_ms()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_has_zero_stddev() {
        let summary = summarize([Some(100.0)]).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.mean, 100.0);
        assert_eq!(summary.stddev, 0.0);
    }

    #[test]
    fn test_sample_standard_deviation() {
        let summary = summarize([Some(100.0), Some(200.0)]).unwrap();
        assert_eq!(summary.mean, 150.0);
        assert!((summary.stddev - 70.710678).abs() < 1e-5, "{}", summary.stddev);
    }

    #[test]
    fn test_absent_values_are_ignored() {
        let with_gap = summarize([Some(100.0), None, Some(200.0)]);
        let without = summarize([Some(100.0), Some(200.0)]);
        assert_eq!(with_gap, without);
    }

    #[test]
    fn test_nothing_to_summarize() {
        assert_eq!(summarize([None, None]), None);
        assert_eq!(summarize(Vec::<Option<f64>>::new()), None);
    }

    #[test]
    fn test_summary_format() {
        let summary = summarize([Some(100.0), Some(200.0)]).unwrap();
        assert_eq!(summary.to_string(), "150.0 +/- 70.71 meters");

        let single = summarize([Some(1234.5678)]).unwrap();
        assert_eq!(single.to_string(), "1234.568 +/- 0 meters");

        let flat = summarize([Some(100.0), Some(100.0)]).unwrap();
        assert_eq!(flat.to_string(), "100.0 +/- 0.0 meters");
    }

    #[test]
    fn test_order_insensitive() {
        let a = summarize([Some(1.0), Some(5.0), Some(9.0)]).unwrap();
        let b = summarize([Some(9.0), Some(1.0), Some(5.0)]).unwrap();
        assert_eq!(a.mean, b.mean);
        assert!((a.stddev - b.stddev).abs() < 1e-12);
    }

    #[test]
    fn test_latency_percentiles() {
        let mut stats = LatencyStats::new();
        for ms in 1..=100 {
            stats.record(Duration::from_millis(ms));
        }
        stats.record_failure();
        stats.record_unroutable();

        assert_eq!(stats.count(), 100);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.unroutable(), 1);
        assert!((stats.quantile_ms(0.5) - 50.0).abs() < 0.5);
        assert!((stats.max_ms() - 100.0).abs() < 0.5);
        assert!(stats.to_string().starts_with("min 1.00 ms"));
    }

    #[test]
    fn test_empty_latency_display() {
        assert_eq!(LatencyStats::new().to_string(), "no requests recorded");
    }
}
