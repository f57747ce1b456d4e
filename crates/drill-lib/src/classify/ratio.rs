//! Fine-tier ratio band classification

use crate::stats::MetricStats;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Guards the ratio against division by zero
pub const EPSILON: f64 = 1e-9;

/// Outcome of comparing a metric across windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Changed,
    Unchanged,
    /// Normal or fault statistics were absent
    NoVerdict,
}

impl Verdict {
    pub fn is_changed(&self) -> bool {
        matches!(self, Verdict::Changed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Changed => write!(f, "changed"),
            Verdict::Unchanged => write!(f, "unchanged"),
            Verdict::NoVerdict => write!(f, "no_verdict"),
        }
    }
}

/// Verdict plus the ratio it was derived from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub verdict: Verdict,
    pub ratio: Option<f64>,
}

impl Classification {
    pub fn no_verdict() -> Self {
        Self {
            verdict: Verdict::NoVerdict,
            ratio: None,
        }
    }
}

/// Inclusive band of fault/normal mean ratios considered unchanged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioBand {
    pub lower: f64,
    pub upper: f64,
}

impl Default for RatioBand {
    fn default() -> Self {
        Self {
            lower: 0.95,
            upper: 1.05,
        }
    }
}

impl RatioBand {
    pub fn ratio(normal_mean: f64, fault_mean: f64) -> f64 {
        (fault_mean + EPSILON) / (normal_mean + EPSILON)
    }

    /// Classify a metric from its normal and fault statistics
    pub fn classify(
        &self,
        normal: Option<&MetricStats>,
        fault: Option<&MetricStats>,
    ) -> Classification {
        let (normal, fault) = match (normal, fault) {
            (Some(n), Some(f)) => (n, f),
            _ => return Classification::no_verdict(),
        };

        let ratio = Self::ratio(normal.mean, fault.mean);
        let verdict = if ratio >= self.lower && ratio <= self.upper {
            Verdict::Unchanged
        } else {
            Verdict::Changed
        };

        Classification {
            verdict,
            ratio: Some(ratio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::summarize;

    fn stats_with_mean(mean: f64) -> MetricStats {
        summarize(&[mean]).unwrap()
    }

    #[test]
    fn test_reflexive_is_unchanged() {
        let band = RatioBand::default();
        for mean in [0.0, 1.0, 42.5, 1e12] {
            let s = stats_with_mean(mean);
            let c = band.classify(Some(&s), Some(&s));
            assert_eq!(c.verdict, Verdict::Unchanged);
            assert!((c.ratio.unwrap() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_band_is_inclusive() {
        let band = RatioBand {
            lower: RatioBand::ratio(4.0, 2.0),
            upper: RatioBand::ratio(4.0, 8.0),
        };
        let normal = stats_with_mean(4.0);
        let at_upper = stats_with_mean(8.0);
        let at_lower = stats_with_mean(2.0);

        assert_eq!(
            band.classify(Some(&normal), Some(&at_upper)).verdict,
            Verdict::Unchanged
        );
        assert_eq!(
            band.classify(Some(&normal), Some(&at_lower)).verdict,
            Verdict::Unchanged
        );
    }

    #[test]
    fn test_default_band_edges() {
        let band = RatioBand::default();
        let normal = stats_with_mean(100.0);
        let inside = stats_with_mean(104.0);
        let above = stats_with_mean(106.0);
        let below = stats_with_mean(94.0);

        assert_eq!(band.classify(Some(&normal), Some(&inside)).verdict, Verdict::Unchanged);
        assert_eq!(band.classify(Some(&normal), Some(&above)).verdict, Verdict::Changed);
        assert_eq!(band.classify(Some(&normal), Some(&below)).verdict, Verdict::Changed);
    }

    #[test]
    fn test_missing_side_is_never_changed() {
        let band = RatioBand::default();
        let s = stats_with_mean(1.0);
        assert_eq!(band.classify(None, Some(&s)).verdict, Verdict::NoVerdict);
        assert_eq!(band.classify(Some(&s), None).verdict, Verdict::NoVerdict);
        assert_eq!(band.classify(None, None).verdict, Verdict::NoVerdict);
        assert!(band.classify(None, Some(&s)).ratio.is_none());
    }

    #[test]
    fn test_zero_baseline_jump_is_changed() {
        let band = RatioBand::default();
        let c = band.classify(Some(&stats_with_mean(0.0)), Some(&stats_with_mean(3.0)));
        assert_eq!(c.verdict, Verdict::Changed);
        assert!(c.ratio.unwrap() > 1e9);
    }
}
