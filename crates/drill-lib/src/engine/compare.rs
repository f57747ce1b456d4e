//! Single (entity, metric) comparison
//!
//! Everything here is computed from the series passed in. Nothing is
//! carried between calls, so a metric without fault-window samples can
//! never inherit another metric's statistics.

use crate::classify::{Classification, RatioBand};
use crate::models::MetricSeries;
use crate::record::MetricComparison;
use crate::stats::{summarize, MetricStats};
use crate::window::ResolvedWindows;

/// Normal and fault statistics of one series
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStats {
    pub normal: Option<MetricStats>,
    pub fault: Option<MetricStats>,
}

impl WindowStats {
    pub fn of(series: &MetricSeries, windows: &ResolvedWindows) -> Self {
        Self {
            normal: summarize(&series.values_in(&windows.baseline)),
            fault: summarize(&series.values_in(std::slice::from_ref(&windows.fault))),
        }
    }

    pub fn classify(&self, band: &RatioBand) -> Classification {
        band.classify(self.normal.as_ref(), self.fault.as_ref())
    }
}

/// Fine-tier comparison; `Some` only when the metric changed
pub fn compare_series(
    series: &MetricSeries,
    windows: &ResolvedWindows,
    band: &RatioBand,
) -> Option<MetricComparison> {
    let stats = WindowStats::of(series, windows);
    let classification = stats.classify(band);
    MetricComparison::changed(stats.normal, stats.fault, classification)
}
