//! Node and pod infrastructure tables
//!
//! Infra tables hold one metric for every entity of a kind, so a single
//! read serves the whole target set.

use super::{group_rows, partition_root, SourceAdapter, TableQuery, TableStore};
use crate::error::SourceError;
use crate::models::{EntityKind, MetricSeries, SourceKind};
use crate::topology::Topology;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const NODE_COLUMN: &str = "kubernetes_node";
const POD_COLUMN: &str = "pod";
const HOST_COLUMN: &str = "instance";

/// Node-level resource metrics for the fixed node set
pub struct NodeInfraAdapter {
    store: Arc<dyn TableStore>,
    topology: Arc<Topology>,
}

impl NodeInfraAdapter {
    pub fn new(store: Arc<dyn TableStore>, topology: Arc<Topology>) -> Self {
        Self { store, topology }
    }

    pub fn table(metric: &str, date: &str) -> PathBuf {
        partition_root(date)
            .join("infra")
            .join("infra_node")
            .join(format!("infra_node_{}_{}.parquet", metric, date))
    }
}

#[async_trait]
impl SourceAdapter for NodeInfraAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::NodeInfra
    }

    async fn fetch(
        &self,
        entity_kind: EntityKind,
        entity: Option<&str>,
        metric: &str,
        date: &str,
    ) -> Result<Vec<MetricSeries>, SourceError> {
        if entity_kind != EntityKind::Node {
            return Ok(Vec::new());
        }

        let query = TableQuery::new(Self::table(metric, date), metric).entity_column(NODE_COLUMN);
        let Some(rows) = self.store.read(&query).await? else {
            debug!(metric = %metric, date = %date, "No node table");
            return Ok(Vec::new());
        };

        Ok(group_rows(rows, EntityKind::Node, metric, |node| {
            self.topology.is_node(node) && entity.map_or(true, |wanted| wanted == node)
        }))
    }
}

/// Pod-level resource metrics, keyed by (host, pod)
pub struct PodInfraAdapter {
    store: Arc<dyn TableStore>,
    topology: Arc<Topology>,
}

impl PodInfraAdapter {
    pub fn new(store: Arc<dyn TableStore>, topology: Arc<Topology>) -> Self {
        Self { store, topology }
    }

    pub fn table(metric: &str, date: &str) -> PathBuf {
        partition_root(date)
            .join("infra")
            .join("infra_pod")
            .join(format!("infra_pod_{}_{}.parquet", metric, date))
    }
}

#[async_trait]
impl SourceAdapter for PodInfraAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::PodInfra
    }

    async fn fetch(
        &self,
        entity_kind: EntityKind,
        entity: Option<&str>,
        metric: &str,
        date: &str,
    ) -> Result<Vec<MetricSeries>, SourceError> {
        if entity_kind != EntityKind::Pod {
            return Ok(Vec::new());
        }

        let query = TableQuery::new(Self::table(metric, date), metric)
            .entity_column(POD_COLUMN)
            .host_column(HOST_COLUMN);
        let Some(rows) = self.store.read(&query).await? else {
            debug!(metric = %metric, date = %date, "No pod table");
            return Ok(Vec::new());
        };

        Ok(group_rows(rows, EntityKind::Pod, metric, |pod| {
            self.topology.is_pod(pod) && entity.map_or(true, |wanted| wanted == pod)
        }))
    }
}
