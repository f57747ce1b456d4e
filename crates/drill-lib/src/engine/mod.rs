//! Fault-interval analysis engine
//!
//! For one fault interval the engine resolves the baseline windows, then
//! runs the four source analyses concurrently:
//! - services: golden signals through the shortlist delegate, then pod drill-down
//! - managed-db components, nodes and pods: fine-tier ratio band per metric
//!
//! Every task builds its own [`AnomalyRecord`] fragment; fragments are merged
//! once all tasks finish.

mod compare;
mod drilldown;


pub use compare::{compare_series, WindowStats};
pub use drilldown::ServiceOutcome;

use crate::classify::{RatioBand, ShortlistDelegate, StatisticalShortlist};
use crate::error::DrillError;
use crate::health::{components, HealthRegistry};
use crate::models::{EntityKind, FaultInterval, MetricSeries, SourceKind};
use crate::observability::{DrillMetrics, StructuredLogger};
use crate::record::{AnomalyRecord, IntervalAnalysis, MetricComparison};
use crate::source::{Sources, TableStore};
use crate::topology::Topology;
use crate::window::{resolve, ResolvedWindows};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default per-call shortlist timeout
pub const DELEGATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the extraction engine
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Timeout applied to each shortlist call
    pub delegate_timeout: Duration,
    /// Concurrent table reads
    pub fetch_concurrency: usize,
    /// Concurrent shortlist calls
    pub delegate_concurrency: usize,
    /// Fine-tier unchanged band
    pub band: RatioBand,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            delegate_timeout: DELEGATE_TIMEOUT,
            fetch_concurrency: 8,
            delegate_concurrency: 4,
            band: RatioBand::default(),
        }
    }
}

/// Anomaly extraction engine; cheap to clone, clones share limits
#[derive(Clone)]
pub struct Extractor {
    topology: Arc<Topology>,
    sources: Sources,
    delegate: Arc<dyn ShortlistDelegate>,
    config: ExtractorConfig,
    fetch_permits: Arc<Semaphore>,
    delegate_permits: Arc<Semaphore>,
    health: Option<HealthRegistry>,
    logger: StructuredLogger,
    metrics: DrillMetrics,
}

impl Extractor {
    pub fn builder() -> ExtractorBuilder {
        ExtractorBuilder::new()
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn delegate_name(&self) -> &str {
        self.delegate.name()
    }

    /// Analyse `intervals[index]` against its neighbours
    pub async fn analyze(
        &self,
        intervals: &[FaultInterval],
        index: usize,
    ) -> Result<IntervalAnalysis, DrillError> {
        let windows = resolve(intervals, index).ok_or(DrillError::IndexOutOfRange {
            index,
            len: intervals.len(),
        })?;
        let interval = &intervals[index];
        let start = Instant::now();
        if let Some(ref health) = self.health {
            health.begin_interval(&interval.uuid).await;
        }

        if !windows.has_baseline() {
            warn!(
                uuid = %interval.uuid,
                index = index,
                "No baseline window, every metric will lack normal statistics"
            );
        }

        let windows = Arc::new(windows);
        let date: Arc<str> = Arc::from(interval.date.as_str());

        let (services, managed_db, nodes, pods) = tokio::join!(
            self.analyze_services(windows.clone(), date.clone()),
            self.analyze_managed_db(windows.clone(), date.clone()),
            self.analyze_nodes(windows.clone(), date.clone()),
            self.analyze_pods(windows.clone(), date.clone()),
        );

        let mut record = AnomalyRecord::default();
        let mut shortlists = BTreeMap::new();
        for outcome in services {
            if let Some(shortlist) = outcome.shortlist {
                shortlists.insert(outcome.service, shortlist);
            }
            record.merge(outcome.record);
        }
        record.merge(managed_db);
        record.merge(nodes);
        record.merge(pods);

        let elapsed = start.elapsed();
        self.metrics.observe_analysis_latency(elapsed.as_secs_f64());
        self.metrics.inc_intervals_analyzed();
        self.logger.log_interval_analyzed(
            &interval.uuid,
            index,
            windows.baseline.len(),
            record.flagged_count(),
            elapsed.as_millis(),
        );

        Ok(IntervalAnalysis {
            uuid: interval.uuid.clone(),
            date: interval.date.clone(),
            index,
            fault_window: windows.fault,
            baseline_windows: windows.baseline.clone(),
            shortlists,
            generated_at: chrono::Utc::now(),
            metrics: record,
        })
    }

    async fn analyze_services(
        &self,
        windows: Arc<ResolvedWindows>,
        date: Arc<str>,
    ) -> Vec<ServiceOutcome> {
        let mut tasks = JoinSet::new();
        for service in self.topology.services() {
            let engine = self.clone();
            let service = service.clone();
            let windows = windows.clone();
            let date = date.clone();
            tasks.spawn(async move { engine.analyze_service(service, windows, date).await });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "Service analysis task failed"),
            }
        }
        outcomes
    }

    async fn analyze_managed_db(&self, windows: Arc<ResolvedWindows>, date: Arc<str>) -> AnomalyRecord {
        let mut tasks = JoinSet::new();
        for component in self.topology.managed_db() {
            for metric in &component.metrics {
                let engine = self.clone();
                let (name, metric) = (component.name.clone(), metric.name.clone());
                let (windows, date) = (windows.clone(), date.clone());
                tasks.spawn(async move {
                    let series = engine
                        .fetch(SourceKind::ManagedDb, EntityKind::Component, Some(name.as_str()), &metric, &date)
                        .await;
                    engine.fine_tier(SourceKind::ManagedDb, &series, &windows, |record, s, cmp| {
                        record.insert_managed_db(&s.entity.id, &s.metric, cmp)
                    })
                });
            }
        }
        collect_fragments(tasks).await
    }

    async fn analyze_nodes(&self, windows: Arc<ResolvedWindows>, date: Arc<str>) -> AnomalyRecord {
        let mut tasks = JoinSet::new();
        for metric in self.topology.node_metrics() {
            let engine = self.clone();
            let metric = metric.clone();
            let (windows, date) = (windows.clone(), date.clone());
            tasks.spawn(async move {
                let series = engine
                    .fetch(SourceKind::NodeInfra, EntityKind::Node, None, &metric, &date)
                    .await;
                engine.fine_tier(SourceKind::NodeInfra, &series, &windows, |record, s, cmp| {
                    record.insert_node(&s.entity.id, &s.metric, cmp)
                })
            });
        }
        collect_fragments(tasks).await
    }

    async fn analyze_pods(&self, windows: Arc<ResolvedWindows>, date: Arc<str>) -> AnomalyRecord {
        let mut tasks = JoinSet::new();
        for metric in self.topology.pod_metrics() {
            let engine = self.clone();
            let metric = metric.clone();
            let (windows, date) = (windows.clone(), date.clone());
            tasks.spawn(async move {
                let series = engine
                    .fetch(SourceKind::PodInfra, EntityKind::Pod, None, &metric, &date)
                    .await;
                engine.fine_tier(SourceKind::PodInfra, &series, &windows, |record, s, cmp| {
                    let host = s.entity.host.as_deref().unwrap_or("unknown");
                    record.insert_pod(host, &s.entity.id, &s.metric, cmp)
                })
            });
        }
        collect_fragments(tasks).await
    }

    /// Compare every series with the ratio band and keep the changed ones
    fn fine_tier<F>(
        &self,
        source: SourceKind,
        series: &[MetricSeries],
        windows: &ResolvedWindows,
        mut insert: F,
    ) -> AnomalyRecord
    where
        F: FnMut(&mut AnomalyRecord, &MetricSeries, MetricComparison),
    {
        let label = source.to_string();
        let mut record = AnomalyRecord::default();
        for s in series {
            self.metrics.inc_comparisons(&label);
            if let Some(cmp) = compare_series(s, windows, &self.config.band) {
                self.metrics.inc_anomalies_flagged(&label);
                debug!(
                    source = %label,
                    entity = %s.entity.id,
                    metric = %s.metric,
                    ratio = cmp.ratio,
                    "Metric changed"
                );
                insert(&mut record, s, cmp);
            }
        }
        record
    }

    /// Fetch under the shared read limit; failures become an empty result
    async fn fetch(
        &self,
        source: SourceKind,
        entity_kind: EntityKind,
        entity: Option<&str>,
        metric: &str,
        date: &str,
    ) -> Vec<MetricSeries> {
        let Ok(_permit) = self.fetch_permits.acquire().await else {
            return Vec::new();
        };

        match self.sources.fetch(source, entity_kind, entity, metric, date).await {
            Ok(series) => {
                if series.is_empty() {
                    debug!(
                        source = %source,
                        entity = ?entity,
                        metric = %metric,
                        date = %date,
                        "No data"
                    );
                }
                series
            }
            Err(e) => {
                self.metrics.inc_source_errors(&source.to_string());
                warn!(
                    source = %source,
                    entity = ?entity,
                    metric = %metric,
                    date = %date,
                    error = %e,
                    "Source read failed, skipping"
                );
                if let Some(ref health) = self.health {
                    health
                        .set_degraded(
                            components::STORE,
                            format!("{} read failed for {} on {}: {}", source, metric, date, e),
                        )
                        .await;
                }
                Vec::new()
            }
        }
    }
}

async fn collect_fragments(mut tasks: JoinSet<AnomalyRecord>) -> AnomalyRecord {
    let mut record = AnomalyRecord::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(fragment) => record.merge(fragment),
            Err(e) => warn!(error = %e, "Metric analysis task failed"),
        }
    }
    record
}

/// Builder for [`Extractor`]
pub struct ExtractorBuilder {
    topology: Option<Arc<Topology>>,
    store: Option<Arc<dyn TableStore>>,
    sources: Option<Sources>,
    delegate: Option<Arc<dyn ShortlistDelegate>>,
    config: ExtractorConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl ExtractorBuilder {
    pub fn new() -> Self {
        Self {
            topology: None,
            store: None,
            sources: None,
            delegate: None,
            config: ExtractorConfig::default(),
            health: None,
            logger: None,
        }
    }

    pub fn topology(mut self, topology: Arc<Topology>) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Table store behind the standard adapters
    pub fn store(mut self, store: Arc<dyn TableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Explicit adapters; takes precedence over [`ExtractorBuilder::store`]
    pub fn sources(mut self, sources: Sources) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Shortlist delegate (default: [`StatisticalShortlist`])
    pub fn delegate(mut self, delegate: Arc<dyn ShortlistDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn delegate_timeout(mut self, timeout: Duration) -> Self {
        self.config.delegate_timeout = timeout;
        self
    }

    pub fn fetch_concurrency(mut self, limit: usize) -> Self {
        self.config.fetch_concurrency = limit;
        self
    }

    pub fn delegate_concurrency(mut self, limit: usize) -> Self {
        self.config.delegate_concurrency = limit;
        self
    }

    pub fn ratio_band(mut self, band: RatioBand) -> Self {
        self.config.band = band;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<Extractor, DrillError> {
        let topology = self.topology.ok_or(DrillError::MissingComponent("topology"))?;
        let sources = match (self.sources, self.store) {
            (Some(sources), _) => sources,
            (None, Some(store)) => Sources::new(store, topology.clone()),
            (None, None) => return Err(DrillError::MissingComponent("table store")),
        };
        let delegate = self
            .delegate
            .unwrap_or_else(|| Arc::new(StatisticalShortlist::default()));

        Ok(Extractor {
            fetch_permits: Arc::new(Semaphore::new(self.config.fetch_concurrency.max(1))),
            delegate_permits: Arc::new(Semaphore::new(self.config.delegate_concurrency.max(1))),
            topology,
            sources,
            delegate,
            config: self.config,
            health: self.health,
            logger: self.logger.unwrap_or_else(|| StructuredLogger::new("local")),
            metrics: DrillMetrics::new(),
        })
    }
}

impl Default for ExtractorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
