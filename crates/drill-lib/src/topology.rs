//! Static topology registry
//!
//! Node, service and pod names plus every metric catalog live in one
//! versioned document (`topology.json`, embedded at build time and
//! overridable from disk). The service to pod relation is indexed once at
//! load so drill-down never pattern-matches names at the call site.

use crate::error::DrillError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

const BUILTIN_TOPOLOGY: &str = include_str!("../topology.json");

/// Role of a managed-database component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentRole {
    /// SQL compute layer
    Compute,
    /// Placement / coordination layer
    Placement,
    /// Storage engine layer
    Storage,
}

/// One metric of a managed-database component and the file holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMetric {
    pub name: String,
    /// File name template; `{date}` is replaced by the partition date
    pub file: String,
}

impl ComponentMetric {
    pub fn file_for(&self, date: &str) -> String {
        self.file.replace("{date}", date)
    }
}

/// A managed-database component with its bespoke catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedDbComponent {
    pub name: String,
    pub role: ComponentRole,
    /// Directory below the date's metric root
    pub directory: String,
    pub metrics: Vec<ComponentMetric>,
}

impl ManagedDbComponent {
    pub fn metric(&self, name: &str) -> Option<&ComponentMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

/// Serialized form of the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TopologyDocument {
    version: u32,
    nodes: Vec<String>,
    services: Vec<String>,
    pods: Vec<String>,
    golden_signals: Vec<String>,
    node_metrics: Vec<String>,
    pod_metrics: Vec<String>,
    managed_db: Vec<ManagedDbComponent>,
}

/// Entity names a downstream consumer may pick a root cause from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEntities {
    pub version: u32,
    pub nodes: Vec<String>,
    pub services: Vec<String>,
    pub pods: Vec<String>,
    pub managed_db: Vec<String>,
}

/// Static registry of the monitored topology
#[derive(Debug, Clone)]
pub struct Topology {
    doc: TopologyDocument,
    /// service -> pods, in pod-list order
    children: HashMap<String, Vec<String>>,
    node_set: HashSet<String>,
    pod_set: HashSet<String>,
}

impl Topology {
    /// The registry shipped with the crate
    pub fn builtin() -> Result<Self, DrillError> {
        Self::from_json(BUILTIN_TOPOLOGY)
    }

    pub fn from_path(path: &Path) -> Result<Self, DrillError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DrillError::Topology(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, DrillError> {
        let doc: TopologyDocument =
            serde_json::from_str(raw).map_err(|e| DrillError::Topology(e.to_string()))?;
        Self::index(doc)
    }

    fn index(doc: TopologyDocument) -> Result<Self, DrillError> {
        ensure_unique("nodes", &doc.nodes)?;
        ensure_unique("services", &doc.services)?;
        ensure_unique("pods", &doc.pods)?;
        ensure_unique("golden_signals", &doc.golden_signals)?;
        ensure_unique("node_metrics", &doc.node_metrics)?;
        ensure_unique("pod_metrics", &doc.pod_metrics)?;

        for component in &doc.managed_db {
            if component.metrics.is_empty() {
                return Err(DrillError::Topology(format!(
                    "managed-db component {} has no metrics",
                    component.name
                )));
            }
            let names: Vec<String> = component.metrics.iter().map(|m| m.name.clone()).collect();
            ensure_unique(&component.name, &names)?;
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for pod in &doc.pods {
            let owners: Vec<&String> = doc
                .services
                .iter()
                .filter(|service| is_replica_of(pod, service))
                .collect();
            match owners.as_slice() {
                [] => {}
                [service] => children.entry((*service).clone()).or_default().push(pod.clone()),
                _ => {
                    return Err(DrillError::Topology(format!(
                        "pod {} matches more than one service",
                        pod
                    )))
                }
            }
        }

        Ok(Self {
            node_set: doc.nodes.iter().cloned().collect(),
            pod_set: doc.pods.iter().cloned().collect(),
            children,
            doc,
        })
    }

    pub fn version(&self) -> u32 {
        self.doc.version
    }

    pub fn nodes(&self) -> &[String] {
        &self.doc.nodes
    }

    pub fn services(&self) -> &[String] {
        &self.doc.services
    }

    pub fn pods(&self) -> &[String] {
        &self.doc.pods
    }

    pub fn golden_signals(&self) -> &[String] {
        &self.doc.golden_signals
    }

    pub fn node_metrics(&self) -> &[String] {
        &self.doc.node_metrics
    }

    pub fn pod_metrics(&self) -> &[String] {
        &self.doc.pod_metrics
    }

    pub fn managed_db(&self) -> &[ManagedDbComponent] {
        &self.doc.managed_db
    }

    pub fn component(&self, name: &str) -> Option<&ManagedDbComponent> {
        self.doc.managed_db.iter().find(|c| c.name == name)
    }

    pub fn is_node(&self, name: &str) -> bool {
        self.node_set.contains(name)
    }

    pub fn is_pod(&self, name: &str) -> bool {
        self.pod_set.contains(name)
    }

    pub fn is_service(&self, name: &str) -> bool {
        self.doc.services.iter().any(|s| s == name)
    }

    pub fn is_golden_signal(&self, metric: &str) -> bool {
        self.doc.golden_signals.iter().any(|m| m == metric)
    }

    /// Pods belonging to a service; empty for unknown services
    pub fn children(&self, service: &str) -> &[String] {
        self.children
            .get(service)
            .map(|pods| pods.as_slice())
            .unwrap_or(&[])
    }

    pub fn candidate_entities(&self) -> CandidateEntities {
        CandidateEntities {
            version: self.doc.version,
            nodes: self.doc.nodes.clone(),
            services: self.doc.services.clone(),
            pods: self.doc.pods.clone(),
            managed_db: self.doc.managed_db.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

/// `pod` is `<service>-<ordinal>`
fn is_replica_of(pod: &str, service: &str) -> bool {
    pod.strip_prefix(service)
        .and_then(|rest| rest.strip_prefix('-'))
        .map(|ordinal| !ordinal.is_empty() && ordinal.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn ensure_unique(what: &str, names: &[String]) -> Result<(), DrillError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(DrillError::Topology(format!(
                "duplicate entry {} in {}",
                name, what
            )));
        }
    }
    Ok(())
}
