//! Service-level APM tables
//!
//! One table per service (and per pod for drill-down), with a column per
//! golden signal.

use super::{partition_root, single_series, SourceAdapter, TableQuery, TableStore};
use crate::error::SourceError;
use crate::models::{EntityKind, EntityRef, MetricSeries, SourceKind};
use crate::topology::Topology;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub struct ServiceApmAdapter {
    store: Arc<dyn TableStore>,
    topology: Arc<Topology>,
}

impl ServiceApmAdapter {
    pub fn new(store: Arc<dyn TableStore>, topology: Arc<Topology>) -> Self {
        Self { store, topology }
    }

    pub fn service_table(service: &str, date: &str) -> PathBuf {
        partition_root(date)
            .join("apm")
            .join("service")
            .join(format!("service_{}_{}.parquet", service, date))
    }

    pub fn pod_table(pod: &str, date: &str) -> PathBuf {
        partition_root(date)
            .join("apm")
            .join("pod")
            .join(format!("pod_{}_{}.parquet", pod, date))
    }

    async fn fetch_one(
        &self,
        entity_kind: EntityKind,
        id: &str,
        metric: &str,
        date: &str,
    ) -> Result<Vec<MetricSeries>, SourceError> {
        let path = match entity_kind {
            EntityKind::Service => Self::service_table(id, date),
            _ => Self::pod_table(id, date),
        };
        match self.store.read(&TableQuery::new(path, metric)).await {
            Ok(Some(rows)) => Ok(single_series(rows, EntityRef::new(entity_kind, id), metric)),
            Ok(None) => {
                debug!(entity = %id, metric = %metric, date = %date, "No APM table");
                Ok(Vec::new())
            }
            // Not every service reports every signal
            Err(SourceError::MissingColumn { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SourceAdapter for ServiceApmAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::ServiceApm
    }

    async fn fetch(
        &self,
        entity_kind: EntityKind,
        entity: Option<&str>,
        metric: &str,
        date: &str,
    ) -> Result<Vec<MetricSeries>, SourceError> {
        let targets: Vec<&str> = match (entity_kind, entity) {
            (EntityKind::Service, Some(id)) if self.topology.is_service(id) => vec![id],
            (EntityKind::Pod, Some(id)) if self.topology.is_pod(id) => vec![id],
            (EntityKind::Service, None) => self.topology.services().iter().map(String::as_str).collect(),
            (EntityKind::Pod, None) => self.topology.pods().iter().map(String::as_str).collect(),
            _ => return Ok(Vec::new()),
        };

        let mut series = Vec::new();
        for id in targets {
            series.extend(self.fetch_one(entity_kind, id, metric, date).await?);
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryStore;
    use polars::prelude::*;

    fn adapter_with(store: MemoryStore) -> ServiceApmAdapter {
        ServiceApmAdapter::new(Arc::new(store), Arc::new(Topology::builtin().unwrap()))
    }

    #[tokio::test]
    async fn test_service_table_lookup() {
        let store = MemoryStore::new();
        store.insert(
            ServiceApmAdapter::service_table("frontend", "2025-06-06"),
            df!("timestamp_ns" => &[2i64, 1], "rrt" => &[20.0, 10.0], "request" => &[5.0, 6.0]).unwrap(),
        );
        let adapter = adapter_with(store);

        let series = adapter
            .fetch(EntityKind::Service, Some("frontend"), "rrt", "2025-06-06")
            .await
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].entity, EntityRef::new(EntityKind::Service, "frontend"));
        assert_eq!(series[0].samples[0].value, 10.0);

        // another date has no table
        let empty = adapter
            .fetch(EntityKind::Service, Some("frontend"), "rrt", "2025-06-07")
            .await
            .unwrap();
        assert!(empty.is_empty());

        let unreported = adapter
            .fetch(EntityKind::Service, Some("frontend"), "timeout", "2025-06-06")
            .await
            .unwrap();
        assert!(unreported.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_entities_are_filtered() {
        let store = MemoryStore::new();
        store.insert(
            ServiceApmAdapter::service_table("billing", "2025-06-06"),
            df!("timestamp_ns" => &[1i64], "rrt" => &[1.0]).unwrap(),
        );
        let adapter = adapter_with(store);

        let series = adapter
            .fetch(EntityKind::Service, Some("billing"), "rrt", "2025-06-06")
            .await
            .unwrap();
        assert!(series.is_empty());

        let wrong_kind = adapter
            .fetch(EntityKind::Node, Some("aiops-k8s-01"), "rrt", "2025-06-06")
            .await
            .unwrap();
        assert!(wrong_kind.is_empty());
    }

    #[test]
    fn test_pod_table_path() {
        assert_eq!(
            ServiceApmAdapter::pod_table("cartservice-1", "2025-06-06"),
            PathBuf::from("2025-06-06/metric-parquet/apm/pod/pod_cartservice-1_2025-06-06.parquet")
        );
    }
}
