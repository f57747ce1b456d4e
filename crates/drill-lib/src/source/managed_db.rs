//! Managed-database component tables
//!
//! Each component has its own directory and file naming, taken verbatim
//! from the topology document.

use super::{partition_root, single_series, SourceAdapter, TableQuery, TableStore};
use crate::error::SourceError;
use crate::models::{EntityKind, EntityRef, MetricSeries, SourceKind};
use crate::topology::{ManagedDbComponent, Topology};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub struct ManagedDbAdapter {
    store: Arc<dyn TableStore>,
    topology: Arc<Topology>,
}

impl ManagedDbAdapter {
    pub fn new(store: Arc<dyn TableStore>, topology: Arc<Topology>) -> Self {
        Self { store, topology }
    }

    /// Table for `metric` of `component`, if the component reports it
    pub fn table(component: &ManagedDbComponent, metric: &str, date: &str) -> Option<PathBuf> {
        component.metric(metric).map(|m| {
            partition_root(date)
                .join(&component.directory)
                .join(m.file_for(date))
        })
    }
}

#[async_trait]
impl SourceAdapter for ManagedDbAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::ManagedDb
    }

    async fn fetch(
        &self,
        entity_kind: EntityKind,
        entity: Option<&str>,
        metric: &str,
        date: &str,
    ) -> Result<Vec<MetricSeries>, SourceError> {
        if entity_kind != EntityKind::Component {
            return Ok(Vec::new());
        }

        let components: Vec<&ManagedDbComponent> = match entity {
            Some(name) => self.topology.component(name).into_iter().collect(),
            None => self.topology.managed_db().iter().collect(),
        };

        let mut series = Vec::new();
        for component in components {
            let Some(path) = Self::table(component, metric, date) else {
                continue;
            };
            match self.store.read(&TableQuery::new(path, metric)).await? {
                Some(rows) => series.extend(single_series(
                    rows,
                    EntityRef::new(EntityKind::Component, component.name.clone()),
                    metric,
                )),
                None => debug!(
                    component = %component.name,
                    metric = %metric,
                    date = %date,
                    "No managed-db table"
                ),
            }
        }
        Ok(series)
    }
}
