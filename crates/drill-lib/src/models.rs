//! Core data models for fault-window analysis

use serde::{Deserialize, Serialize};
use std::fmt;

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A labelled time range known to contain an anomaly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultInterval {
    pub uuid: String,
    /// Partition date of the backing tables (`YYYY-MM-DD`)
    pub date: String,
    pub start_ts_ns: i64,
    pub end_ts_ns: i64,
}

impl FaultInterval {
    /// The fault window itself, inclusive on both ends
    pub fn window(&self) -> Window {
        Window::new(self.start_ts_ns, self.end_ts_ns)
    }
}

/// Time range with inclusive bounds, nanosecond resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start_ts_ns: i64,
    pub end_ts_ns: i64,
}

impl Window {
    pub fn new(start_ts_ns: i64, end_ts_ns: i64) -> Self {
        Self {
            start_ts_ns,
            end_ts_ns,
        }
    }

    pub fn contains(&self, ts_ns: i64) -> bool {
        ts_ns >= self.start_ts_ns && ts_ns <= self.end_ts_ns
    }

    pub fn intersects(&self, other: &Window) -> bool {
        self.start_ts_ns <= other.end_ts_ns && other.start_ts_ns <= self.end_ts_ns
    }

    /// A window whose start lies after its end holds no samples
    pub fn is_empty(&self) -> bool {
        self.start_ts_ns > self.end_ts_ns
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start_ts_ns, self.end_ts_ns)
    }
}

/// Which backing source a series comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ServiceApm,
    NodeInfra,
    PodInfra,
    ManagedDb,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::ServiceApm => write!(f, "service_apm"),
            SourceKind::NodeInfra => write!(f, "node_infra"),
            SourceKind::PodInfra => write!(f, "pod_infra"),
            SourceKind::ManagedDb => write!(f, "managed_db"),
        }
    }
}

/// Granularity of the entity a series describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Service,
    Pod,
    Node,
    Component,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Service => write!(f, "service"),
            EntityKind::Pod => write!(f, "pod"),
            EntityKind::Node => write!(f, "node"),
            EntityKind::Component => write!(f, "component"),
        }
    }
}

/// Identity of the entity behind a series
///
/// `host` is only populated for pod-infra rows, which are keyed by
/// (host, pod).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            host: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// One observation of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ns: i64,
    pub value: f64,
}

/// Ordered samples for one (entity, metric)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub entity: EntityRef,
    pub metric: String,
    pub samples: Vec<Sample>,
}

impl MetricSeries {
    pub fn new(entity: EntityRef, metric: impl Into<String>, mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp_ns);
        Self {
            entity,
            metric: metric.into(),
            samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Values falling inside any of the given windows, in time order
    pub fn values_in(&self, windows: &[Window]) -> Vec<f64> {
        self.samples
            .iter()
            .filter(|s| windows.iter().any(|w| w.contains(s.timestamp_ns)))
            .map(|s| s.value)
            .collect()
    }
}
