//! Component health for the extraction run
//!
//! The table store, the shortlist delegate and the engine report here; the
//! binary exposes the result on `/healthz` and `/readyz`. Every status change
//! is stamped with the fault interval being analysed at the time and
//! repeated degradations of one component are counted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Failures absorbed, run continues with less data
    Degraded,
    /// Nothing useful can come out of this component
    Unhealthy,
}

/// Health of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// uuid of the fault interval under analysis when the status last changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Failures reported since the component was last healthy
    pub failures: u64,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>, interval: Option<String>) -> Self {
        Self {
            status,
            message,
            interval,
            failures: 0,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None, None)
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    /// Valid fault intervals loaded for this run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervals: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const STORE: &str = "store";
    pub const DELEGATE: &str = "delegate";
    pub const ENGINE: &str = "engine";
}

#[derive(Debug, Default)]
struct RunState {
    /// Interval count once the table is loaded
    loaded: Option<usize>,
    current_interval: Option<String>,
}

/// Health registry for one extraction run
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    run: Arc<RwLock<RunState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Record the interval table as loaded; the run becomes ready
    pub async fn set_loaded(&self, intervals: usize) {
        self.run.write().await.loaded = Some(intervals);
    }

    /// Interval whose analysis is starting; later status changes refer to it
    pub async fn begin_interval(&self, uuid: &str) {
        self.run.write().await.current_interval = Some(uuid.to_string());
    }

    pub async fn set_healthy(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Degraded, message.into()).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Unhealthy, message.into()).await;
    }

    async fn report(&self, name: &str, status: ComponentStatus, message: String) {
        let interval = self.run.read().await.current_interval.clone();
        let mut components = self.components.write().await;
        let failures = components.get(name).map(|c| c.failures).unwrap_or(0) + 1;

        // an unhealthy component stays unhealthy until reset
        let status = match components.get(name) {
            Some(c) if c.status == ComponentStatus::Unhealthy => ComponentStatus::Unhealthy,
            _ => status,
        };

        let mut health = ComponentHealth::new(status, Some(message), interval);
        health.failures = failures;
        components.insert(name.to_string(), health);
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready once the intervals are loaded and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let loaded = self.run.read().await.loaded;
        let components = self.components.read().await;
        let unhealthy: Vec<&str> = components
            .iter()
            .filter(|(_, c)| c.status == ComponentStatus::Unhealthy)
            .map(|(name, _)| name.as_str())
            .collect();

        let reason = match (loaded, unhealthy.is_empty()) {
            (None, _) => Some("Interval table not loaded".to_string()),
            (Some(_), false) => Some(format!("Unhealthy: {}", unhealthy.join(", "))),
            (Some(_), true) => None,
        };

        ReadinessResponse {
            ready: reason.is_none(),
            intervals: loaded,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_starts_empty_and_not_ready() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.intervals.is_none());
        assert_eq!(readiness.reason.as_deref(), Some("Interval table not loaded"));
    }

    #[tokio::test]
    async fn test_delegate_degraded_keeps_run_ready() {
        let registry = HealthRegistry::new();
        registry.register(components::STORE).await;
        registry.register(components::DELEGATE).await;
        registry.set_loaded(3).await;

        registry.set_degraded(components::DELEGATE, "shortlist timed out").await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.components[components::DELEGATE].message.is_some());
        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert_eq!(readiness.intervals, Some(3));

        registry.set_healthy(components::DELEGATE).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_degradation_is_stamped_with_interval_and_counted() {
        let registry = HealthRegistry::new();
        registry.register(components::STORE).await;

        registry.begin_interval("f-0").await;
        registry.set_degraded(components::STORE, "node_infra read failed").await;
        registry.begin_interval("f-1").await;
        registry.set_degraded(components::STORE, "pod_infra read failed").await;

        let store = &registry.health().await.components[components::STORE];
        assert_eq!(store.interval.as_deref(), Some("f-1"));
        assert_eq!(store.failures, 2);
        assert_eq!(store.message.as_deref(), Some("pod_infra read failed"));

        registry.set_healthy(components::STORE).await;
        assert_eq!(registry.health().await.components[components::STORE].failures, 0);
    }

    #[tokio::test]
    async fn test_unhealthy_store_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.register(components::STORE).await;
        registry.register(components::ENGINE).await;
        registry.set_loaded(3).await;
        registry.set_unhealthy(components::STORE, "data root missing").await;
        // a later absorbed failure does not hide the outage
        registry.set_degraded(components::STORE, "read failed").await;

        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Unhealthy: store"));
    }
}
