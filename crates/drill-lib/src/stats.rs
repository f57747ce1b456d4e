//! Robust descriptive statistics for one metric over one window set
//!
//! The single minimum and single maximum are dropped before computing
//! location and spread whenever more than two samples exist. The non-zero
//! ratio is always taken over the untrimmed samples.

use serde::{Deserialize, Serialize};

/// Percentiles reported for every summary
const PERCENTILES: [f64; 5] = [0.25, 0.50, 0.75, 0.95, 0.99];

/// Sample counts at or below this are summarized untrimmed
const MAX_UNTRIMMED: usize = 2;

/// Descriptive statistics for a metric over a window set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    /// Number of samples after trimming
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; undefined for a single sample
    pub std: Option<f64>,
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
    /// Fraction of the untrimmed samples strictly greater than zero
    pub non_zero_ratio: f64,
}

/// Summarize a sample set
///
/// NaN marks a missing sample and is dropped; infinities are kept and take
/// part in the trim like any other value. Returns `None` when nothing is
/// left; absence must never be replaced by a zeroed summary.
pub fn summarize(samples: &[f64]) -> Option<MetricStats> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let non_zero = sorted.iter().filter(|v| **v > 0.0).count();
    let non_zero_ratio = round3(non_zero as f64 / sorted.len() as f64);

    let trimmed = if sorted.len() <= MAX_UNTRIMMED {
        &sorted[..]
    } else {
        &sorted[1..sorted.len() - 1]
    };

    let count = trimmed.len();
    let mean = trimmed.iter().sum::<f64>() / count as f64;
    let std = if count > 1 {
        let variance = trimmed.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / (count - 1) as f64; // Bessel's correction
        Some(variance.sqrt())
    } else {
        None
    };

    let [p25, p50, p75, p95, p99] = PERCENTILES.map(|p| percentile(trimmed, p));

    Some(MetricStats {
        count,
        mean,
        std,
        min: trimmed[0],
        p25,
        p50,
        p75,
        p95,
        p99,
        max: trimmed[count - 1],
        non_zero_ratio,
    })
}

/// Linear-interpolated percentile of an ascending, non-empty slice
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    let (lo, hi) = (sorted[lower], sorted[upper]);
    // inf - inf would turn an exact hit into NaN
    if frac == 0.0 || lo == hi {
        return lo;
    }
    lo + (hi - lo) * frac
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
