//! Coarse-tier shortlist delegation
//!
//! The engine hands the normal and fault statistics of one entity's golden
//! signals to a delegate and receives the names it considers changed. It
//! applies no threshold of its own, only the missing-data rule and the
//! catalog filter in [`accept_shortlist`].

use super::ratio::EPSILON;
use crate::error::DelegateError;
use crate::stats::MetricStats;
use crate::topology::Topology;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// Per-metric statistics for one entity and one window set
pub type StatsMap = BTreeMap<String, MetricStats>;

/// Capability that picks changed metrics from two statistics maps
#[async_trait]
pub trait ShortlistDelegate: Send + Sync {
    /// Short identifier used in logs and metrics
    fn name(&self) -> &str;

    /// Return the metric names judged changed for `entity`
    async fn shortlist(
        &self,
        entity: &str,
        normal: &StatsMap,
        fault: &StatsMap,
    ) -> Result<BTreeSet<String>, DelegateError>;
}

/// Restrict a delegate's answer to catalog metrics with data on both sides
pub fn accept_shortlist(
    raw: &BTreeSet<String>,
    normal: &StatsMap,
    fault: &StatsMap,
    topology: &Topology,
) -> Vec<String> {
    raw.iter()
        .filter(|m| topology.is_golden_signal(m))
        .filter(|m| normal.contains_key(*m) && fault.contains_key(*m))
        .cloned()
        .collect()
}

/// Deterministic shortlist based on z-score and relative change
///
/// A metric is flagged when its fault mean sits at least `z_threshold`
/// normal standard deviations away from the normal mean and differs from
/// it by at least `min_relative_change` of the normal mean.
#[derive(Debug, Clone)]
pub struct StatisticalShortlist {
    pub z_threshold: f64,
    pub min_relative_change: f64,
}

impl Default for StatisticalShortlist {
    fn default() -> Self {
        Self {
            z_threshold: 3.0, // 3 sigma
            min_relative_change: 0.05,
        }
    }
}

impl StatisticalShortlist {
    pub fn new(z_threshold: f64, min_relative_change: f64) -> Self {
        Self {
            z_threshold,
            min_relative_change,
        }
    }

    fn is_changed(&self, normal: &MetricStats, fault: &MetricStats) -> bool {
        let delta = (fault.mean - normal.mean).abs();
        if delta <= EPSILON {
            return false;
        }

        let z_score = match normal.std {
            Some(std) if std > EPSILON => delta / std,
            _ => f64::INFINITY,
        };
        let relative = delta / normal.mean.abs().max(EPSILON);

        z_score >= self.z_threshold && relative >= self.min_relative_change
    }

    /// Synchronous form used by the async delegate impl
    pub fn evaluate(&self, normal: &StatsMap, fault: &StatsMap) -> BTreeSet<String> {
        normal
            .iter()
            .filter_map(|(metric, n)| fault.get(metric).map(|f| (metric, n, f)))
            .filter(|(_, n, f)| self.is_changed(n, f))
            .map(|(metric, _, _)| metric.clone())
            .collect()
    }
}

#[async_trait]
impl ShortlistDelegate for StatisticalShortlist {
    fn name(&self) -> &str {
        "statistical"
    }

    async fn shortlist(
        &self,
        _entity: &str,
        normal: &StatsMap,
        fault: &StatsMap,
    ) -> Result<BTreeSet<String>, DelegateError> {
        Ok(self.evaluate(normal, fault))
    }
}
