//! Service golden signals and pod drill-down
//!
//! A service's golden signals are summarized and handed to the shortlist
//! delegate in one call. Only the accepted shortlist is re-examined on the
//! service's pods, so drill-down costs at most `pods x shortlist` fetches.

use super::{compare_series, Extractor, WindowStats};
use crate::classify::{accept_shortlist, StatsMap};
use crate::health::components;
use crate::models::{EntityKind, SourceKind};
use crate::record::AnomalyRecord;
use crate::window::ResolvedWindows;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Result of analysing one service
#[derive(Debug, Clone, Default)]
pub struct ServiceOutcome {
    pub service: String,
    /// Accepted shortlist; `None` when the delegate was never consulted
    pub shortlist: Option<Vec<String>>,
    pub record: AnomalyRecord,
}

impl Extractor {
    pub(super) async fn analyze_service(
        &self,
        service: String,
        windows: Arc<ResolvedWindows>,
        date: Arc<str>,
    ) -> ServiceOutcome {
        let mut outcome = ServiceOutcome {
            service: service.clone(),
            ..Default::default()
        };

        let (normal, fault) = self.golden_signal_stats(&service, &windows, &date).await;
        if normal.is_empty() || fault.is_empty() {
            debug!(
                service = %service,
                normal_metrics = normal.len(),
                fault_metrics = fault.len(),
                "Golden signals incomplete, no shortlist"
            );
            return outcome;
        }

        let raw = self.request_shortlist(&service, &normal, &fault).await;
        let accepted = accept_shortlist(&raw, &normal, &fault, &self.topology);
        if accepted.len() < raw.len() {
            debug!(
                service = %service,
                raw = ?raw,
                accepted = ?accepted,
                "Dropped shortlist entries outside catalog or without data"
            );
        }
        self.logger.log_shortlist(&service, self.delegate.name(), &accepted);

        if !accepted.is_empty() {
            outcome.record = self.drill_down(&service, &accepted, windows, date).await;
        }
        outcome.shortlist = Some(accepted);
        outcome
    }

    async fn golden_signal_stats(
        &self,
        service: &str,
        windows: &ResolvedWindows,
        date: &str,
    ) -> (StatsMap, StatsMap) {
        let mut normal = StatsMap::new();
        let mut fault = StatsMap::new();

        for metric in self.topology.golden_signals() {
            let series = self
                .fetch(SourceKind::ServiceApm, EntityKind::Service, Some(service), metric, date)
                .await;
            // one table per service, so at most one series
            let Some(series) = series.first() else {
                continue;
            };
            let stats = WindowStats::of(series, windows);
            if let Some(n) = stats.normal {
                normal.insert(metric.clone(), n);
            }
            if let Some(f) = stats.fault {
                fault.insert(metric.clone(), f);
            }
        }
        (normal, fault)
    }

    /// Ask the delegate under the shared call limit; any failure is an empty shortlist
    async fn request_shortlist(
        &self,
        service: &str,
        normal: &StatsMap,
        fault: &StatsMap,
    ) -> BTreeSet<String> {
        let Ok(_permit) = self.delegate_permits.acquire().await else {
            return BTreeSet::new();
        };
        self.metrics.inc_delegate_calls();

        let result = tokio::time::timeout(
            self.config.delegate_timeout,
            self.delegate.shortlist(service, normal, fault),
        )
        .await;

        let reason = match result {
            Ok(Ok(shortlist)) => return shortlist,
            Ok(Err(e)) => {
                self.metrics.inc_delegate_failures();
                format!("delegate error: {}", e)
            }
            Err(_) => {
                self.metrics.inc_delegate_timeouts();
                format!(
                    "delegate timed out after {}s",
                    self.config.delegate_timeout.as_secs_f64()
                )
            }
        };

        self.logger
            .log_delegate_degraded(service, self.delegate.name(), &reason);
        if let Some(ref health) = self.health {
            health
                .set_degraded(components::DELEGATE, format!("{}: {}", service, reason))
                .await;
        }
        BTreeSet::new()
    }

    /// Fine-tier comparison of the shortlisted metrics on each pod of `service`
    async fn drill_down(
        &self,
        service: &str,
        shortlist: &[String],
        windows: Arc<ResolvedWindows>,
        date: Arc<str>,
    ) -> AnomalyRecord {
        let children = self.topology.children(service);
        if children.is_empty() {
            debug!(service = %service, "No pods to drill into");
            return AnomalyRecord::default();
        }

        let mut tasks = JoinSet::new();
        for pod in children {
            let engine = self.clone();
            let (service, pod) = (service.to_string(), pod.clone());
            let shortlist = shortlist.to_vec();
            let (windows, date) = (windows.clone(), date.clone());
            tasks.spawn(async move {
                let label = SourceKind::ServiceApm.to_string();
                let mut record = AnomalyRecord::default();
                for metric in &shortlist {
                    let series = engine
                        .fetch(SourceKind::ServiceApm, EntityKind::Pod, Some(pod.as_str()), metric, &date)
                        .await;
                    for s in &series {
                        engine.metrics.inc_comparisons(&label);
                        if let Some(cmp) = compare_series(s, &windows, &engine.config.band) {
                            engine.metrics.inc_anomalies_flagged(&label);
                            record.insert_service(&service, &pod, metric, cmp);
                        }
                    }
                }
                record
            });
        }

        let mut record = AnomalyRecord::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(fragment) => record.merge(fragment),
                Err(e) => warn!(service = %service, error = %e, "Pod drill-down task failed"),
            }
        }
        record
    }
}
