//! Fault-window metric anomaly extraction
//!
//! This crate provides the core functionality for:
//! - Baseline window resolution around labelled fault intervals
//! - Robust per-metric statistics over normal and fault windows
//! - Two-tier change classification (shortlist delegate + ratio band)
//! - Service to pod drill-down restricted to shortlisted metrics
//! - Health checks and observability

pub mod classify;
pub mod engine;
pub mod error;
pub mod health;
pub mod intervals;
pub mod models;
pub mod observability;
pub mod record;
pub mod source;
pub mod stats;
pub mod topology;
pub mod window;

pub use error::{DelegateError, DrillError, SourceError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{DrillMetrics, StructuredLogger};
