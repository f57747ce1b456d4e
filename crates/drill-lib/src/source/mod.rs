//! Time-series source adapters
//!
//! Each adapter knows where one family of metrics lives and which entities
//! it is allowed to return. Lookups against a missing table yield an empty
//! result, and rows for entities outside the topology's target set are
//! dropped before anything leaves the adapter.

mod apm;
mod infra;
mod managed_db;
mod store;

pub use apm::ServiceApmAdapter;
pub use infra::{NodeInfraAdapter, PodInfraAdapter};
pub use managed_db::ManagedDbAdapter;
pub use store::{rows_from_frame, MemoryStore, MetricRow, ParquetStore, TableQuery, TableStore, TIMESTAMP_COLUMN};

use crate::error::SourceError;
use crate::models::{EntityKind, EntityRef, MetricSeries, Sample, SourceKind};
use crate::topology::Topology;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Uniform fetch interface over one source family
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Series for `metric` on `date`; `entity = None` means every target
    /// entity of `entity_kind` this adapter serves
    async fn fetch(
        &self,
        entity_kind: EntityKind,
        entity: Option<&str>,
        metric: &str,
        date: &str,
    ) -> Result<Vec<MetricSeries>, SourceError>;
}

/// Directory holding one date's metric tables, relative to the store root
pub fn partition_root(date: &str) -> PathBuf {
    PathBuf::from(date).join("metric-parquet")
}

/// The four adapters, dispatched by [`SourceKind`]
#[derive(Clone)]
pub struct Sources {
    service_apm: Arc<dyn SourceAdapter>,
    node_infra: Arc<dyn SourceAdapter>,
    pod_infra: Arc<dyn SourceAdapter>,
    managed_db: Arc<dyn SourceAdapter>,
}

impl Sources {
    /// Standard adapters over a shared table store
    pub fn new(store: Arc<dyn TableStore>, topology: Arc<Topology>) -> Self {
        Self {
            service_apm: Arc::new(ServiceApmAdapter::new(store.clone(), topology.clone())),
            node_infra: Arc::new(NodeInfraAdapter::new(store.clone(), topology.clone())),
            pod_infra: Arc::new(PodInfraAdapter::new(store.clone(), topology.clone())),
            managed_db: Arc::new(ManagedDbAdapter::new(store, topology)),
        }
    }

    /// Replace one adapter, keyed by the kind it reports
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        match adapter.kind() {
            SourceKind::ServiceApm => self.service_apm = adapter,
            SourceKind::NodeInfra => self.node_infra = adapter,
            SourceKind::PodInfra => self.pod_infra = adapter,
            SourceKind::ManagedDb => self.managed_db = adapter,
        }
        self
    }

    pub fn adapter(&self, kind: SourceKind) -> &Arc<dyn SourceAdapter> {
        match kind {
            SourceKind::ServiceApm => &self.service_apm,
            SourceKind::NodeInfra => &self.node_infra,
            SourceKind::PodInfra => &self.pod_infra,
            SourceKind::ManagedDb => &self.managed_db,
        }
    }

    pub async fn fetch(
        &self,
        kind: SourceKind,
        entity_kind: EntityKind,
        entity: Option<&str>,
        metric: &str,
        date: &str,
    ) -> Result<Vec<MetricSeries>, SourceError> {
        self.adapter(kind).fetch(entity_kind, entity, metric, date).await
    }
}

/// Split rows into one series per (host, entity), keeping only accepted entities
fn group_rows<F>(
    rows: Vec<MetricRow>,
    entity_kind: EntityKind,
    metric: &str,
    accept: F,
) -> Vec<MetricSeries>
where
    F: Fn(&str) -> bool,
{
    let mut groups: BTreeMap<(Option<String>, String), Vec<Sample>> = BTreeMap::new();
    for row in rows {
        let Some(entity) = row.entity else { continue };
        if !accept(&entity) {
            continue;
        }
        groups.entry((row.host, entity)).or_default().push(Sample {
            timestamp_ns: row.timestamp_ns,
            value: row.value,
        });
    }

    groups
        .into_iter()
        .map(|((host, id), samples)| {
            let mut entity = EntityRef::new(entity_kind, id);
            if let Some(host) = host {
                entity = entity.with_host(host);
            }
            MetricSeries::new(entity, metric, samples)
        })
        .collect()
}

/// Wrap rows of a single-entity table as one series
fn single_series(rows: Vec<MetricRow>, entity: EntityRef, metric: &str) -> Vec<MetricSeries> {
    if rows.is_empty() {
        return Vec::new();
    }
    let samples = rows
        .into_iter()
        .map(|row| Sample {
            timestamp_ns: row.timestamp_ns,
            value: row.value,
        })
        .collect();
    vec![MetricSeries::new(entity, metric, samples)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts: i64, entity: &str, host: Option<&str>) -> MetricRow {
        MetricRow {
            timestamp_ns: ts,
            value: ts as f64,
            entity: Some(entity.to_string()),
            host: host.map(str::to_string),
        }
    }

    #[test]
    fn test_group_rows_by_host_and_entity() {
        let rows = vec![
            row(3, "frontend-0", Some("aiops-k8s-01")),
            row(1, "frontend-0", Some("aiops-k8s-01")),
            row(2, "frontend-0", Some("aiops-k8s-02")),
            row(4, "intruder-0", Some("aiops-k8s-01")),
        ];
        let series = group_rows(rows, EntityKind::Pod, "pod_cpu_usage", |e| e != "intruder-0");

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].entity.host.as_deref(), Some("aiops-k8s-01"));
        assert_eq!(series[0].samples.len(), 2);
        assert_eq!(series[0].samples[0].timestamp_ns, 1);
        assert_eq!(series[1].entity.host.as_deref(), Some("aiops-k8s-02"));
    }

    #[test]
    fn test_partition_root() {
        assert_eq!(
            partition_root("2025-06-06"),
            PathBuf::from("2025-06-06/metric-parquet")
        );
    }
}
