//! Anomaly record handed to the downstream fusion stage

use crate::classify::{Classification, Verdict};
use crate::models::{SourceKind, Window};
use crate::stats::MetricStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// metric name -> comparison
pub type MetricMap = BTreeMap<String, MetricComparison>;

/// Normal and fault statistics of a metric judged changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub normal_stats: MetricStats,
    pub fault_stats: MetricStats,
    pub ratio: f64,
    pub verdict: Verdict,
}

impl MetricComparison {
    /// Only a `changed` classification backed by both sides yields an entry
    pub fn changed(
        normal: Option<MetricStats>,
        fault: Option<MetricStats>,
        classification: Classification,
    ) -> Option<Self> {
        if !classification.verdict.is_changed() {
            return None;
        }
        Some(Self {
            normal_stats: normal?,
            fault_stats: fault?,
            ratio: classification.ratio?,
            verdict: classification.verdict,
        })
    }
}

/// Nested per-source anomaly map for one fault interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// service -> pod -> metric
    pub service: BTreeMap<String, BTreeMap<String, MetricMap>>,
    /// component -> metric
    pub managed_db: BTreeMap<String, MetricMap>,
    /// node -> metric
    pub node: BTreeMap<String, MetricMap>,
    /// host -> pod -> metric
    pub pod: BTreeMap<String, BTreeMap<String, MetricMap>>,
}

/// Flattened view of one flagged leaf
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedEntry<'a> {
    pub scope: SourceKind,
    pub entity: String,
    pub metric: &'a str,
    pub comparison: &'a MetricComparison,
}

impl AnomalyRecord {
    pub fn insert_service(&mut self, service: &str, pod: &str, metric: &str, cmp: MetricComparison) {
        self.service
            .entry(service.to_string())
            .or_default()
            .entry(pod.to_string())
            .or_default()
            .insert(metric.to_string(), cmp);
    }

    pub fn insert_managed_db(&mut self, component: &str, metric: &str, cmp: MetricComparison) {
        self.managed_db
            .entry(component.to_string())
            .or_default()
            .insert(metric.to_string(), cmp);
    }

    pub fn insert_node(&mut self, node: &str, metric: &str, cmp: MetricComparison) {
        self.node
            .entry(node.to_string())
            .or_default()
            .insert(metric.to_string(), cmp);
    }

    pub fn insert_pod(&mut self, host: &str, pod: &str, metric: &str, cmp: MetricComparison) {
        self.pod
            .entry(host.to_string())
            .or_default()
            .entry(pod.to_string())
            .or_default()
            .insert(metric.to_string(), cmp);
    }

    /// Fold an entity-local fragment into this record
    pub fn merge(&mut self, other: AnomalyRecord) {
        for (service, pods) in other.service {
            let target = self.service.entry(service).or_default();
            for (pod, metrics) in pods {
                target.entry(pod).or_default().extend(metrics);
            }
        }
        for (component, metrics) in other.managed_db {
            self.managed_db.entry(component).or_default().extend(metrics);
        }
        for (node, metrics) in other.node {
            self.node.entry(node).or_default().extend(metrics);
        }
        for (host, pods) in other.pod {
            let target = self.pod.entry(host).or_default();
            for (pod, metrics) in pods {
                target.entry(pod).or_default().extend(metrics);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flagged_count() == 0
    }

    pub fn flagged_count(&self) -> usize {
        self.entries().len()
    }

    pub fn entries(&self) -> Vec<FlaggedEntry<'_>> {
        let mut out = Vec::new();
        for (service, pods) in &self.service {
            for (pod, metrics) in pods {
                push_entries(&mut out, SourceKind::ServiceApm, format!("{}/{}", service, pod), metrics);
            }
        }
        for (component, metrics) in &self.managed_db {
            push_entries(&mut out, SourceKind::ManagedDb, component.clone(), metrics);
        }
        for (node, metrics) in &self.node {
            push_entries(&mut out, SourceKind::NodeInfra, node.clone(), metrics);
        }
        for (host, pods) in &self.pod {
            for (pod, metrics) in pods {
                push_entries(&mut out, SourceKind::PodInfra, format!("{}/{}", host, pod), metrics);
            }
        }
        out
    }
}

fn push_entries<'a>(
    out: &mut Vec<FlaggedEntry<'a>>,
    scope: SourceKind,
    entity: String,
    metrics: &'a MetricMap,
) {
    for (metric, comparison) in metrics {
        out.push(FlaggedEntry {
            scope,
            entity: entity.clone(),
            metric,
            comparison,
        });
    }
}

/// One output line: the analysis of a single fault interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalAnalysis {
    pub uuid: String,
    pub date: String,
    pub index: usize,
    pub fault_window: Window,
    pub baseline_windows: Vec<Window>,
    /// service -> accepted coarse-tier shortlist
    pub shortlists: BTreeMap<String, Vec<String>>,
    pub generated_at: DateTime<Utc>,
    pub metrics: AnomalyRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::RatioBand;
    use crate::stats::summarize;

    fn comparison(normal: f64, fault: f64) -> MetricComparison {
        let n = summarize(&[normal]);
        let f = summarize(&[fault]);
        let c = RatioBand::default().classify(n.as_ref(), f.as_ref());
        MetricComparison::changed(n, f, c).unwrap()
    }

    #[test]
    fn test_only_changed_yields_entry() {
        let band = RatioBand::default();
        let n = summarize(&[10.0]);
        let f = summarize(&[10.2]);
        let c = band.classify(n.as_ref(), f.as_ref());
        assert!(MetricComparison::changed(n.clone(), f, c).is_none());

        let c = band.classify(n.as_ref(), None);
        assert!(MetricComparison::changed(n, None, c).is_none());
    }

    #[test]
    fn test_merge_fragments() {
        let mut record = AnomalyRecord::default();
        record.insert_node("aiops-k8s-03", "node_cpu_usage_rate", comparison(20.0, 90.0));

        let mut fragment = AnomalyRecord::default();
        fragment.insert_node("aiops-k8s-03", "node_memory_usage_rate", comparison(40.0, 80.0));
        fragment.insert_service("frontend", "frontend-0", "rrt", comparison(5.0, 50.0));
        fragment.insert_pod("aiops-k8s-01", "cartservice-0", "pod_cpu_usage", comparison(0.1, 0.9));

        record.merge(fragment);

        assert_eq!(record.node["aiops-k8s-03"].len(), 2);
        assert_eq!(record.flagged_count(), 4);
        let scopes: Vec<SourceKind> = record.entries().iter().map(|e| e.scope).collect();
        assert_eq!(
            scopes,
            vec![
                SourceKind::ServiceApm,
                SourceKind::NodeInfra,
                SourceKind::NodeInfra,
                SourceKind::PodInfra
            ]
        );
    }

    #[test]
    fn test_record_serializes_with_stats_fields() {
        let mut record = AnomalyRecord::default();
        record.insert_managed_db("tidb-tikv", "rocksdb_write_stall", comparison(0.0, 4.0));

        let json = serde_json::to_value(&record).unwrap();
        let leaf = &json["managed_db"]["tidb-tikv"]["rocksdb_write_stall"];
        assert_eq!(leaf["verdict"], "changed");
        assert_eq!(leaf["fault_stats"]["mean"], 4.0);
        assert!(leaf["normal_stats"]["std"].is_null());
        assert!(json["service"].as_object().unwrap().is_empty());
    }
}
