//! metric-drill - fault-window metric anomaly extraction
//!
//! Reads the labelled fault intervals, compares every monitored metric
//! between each fault window and its surrounding normal windows, and appends
//! one JSON line per interval for the downstream fusion stage.

mod api;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crate::config::{DelegateConfig, DelegateKind, DrillConfig};
use drill_lib::{
    classify::{HttpShortlist, HttpShortlistConfig, ShortlistDelegate, StatisticalShortlist},
    engine::Extractor,
    health::{components, HealthRegistry},
    intervals::{load_intervals, IntervalTable},
    observability::{DrillMetrics, StructuredLogger},
    record::IntervalAnalysis,
    source::ParquetStore,
    topology::Topology,
    window::resolve,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DRILL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "metric-drill")]
#[command(author, version, about = "Fault-window metric anomaly extraction", long_about = None)]
pub struct Cli {
    /// Configuration file (DRILL__* environment variables override it)
    #[arg(long, short, env = "DRILL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse the fault intervals and append one JSON line per interval
    Run {
        /// First interval index to analyse
        #[arg(long, default_value_t = 0)]
        from: usize,

        /// Analyse only this interval index
        #[arg(long)]
        only: Option<usize>,
    },

    /// Show the fault and baseline windows resolved for one interval
    Windows {
        #[arg(long, short)]
        index: usize,
    },

    /// Print the candidate root-cause entities
    Topology,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.pretty {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }

    let config = DrillConfig::load(cli.config.as_deref())?;
    let topology = Arc::new(load_topology(config.topology_path.as_deref())?);

    match cli.command {
        Commands::Run { from, only } => run(config, topology, from, only).await,
        Commands::Windows { index } => {
            let table = load_intervals(&config.input_path)
                .with_context(|| format!("loading {}", config.input_path.display()))?;
            let windows = resolve(&table.intervals, index).with_context(|| {
                format!("interval index {} out of range for {} intervals", index, table.len())
            })?;
            output::print_windows(&table.intervals[index], index, &windows);
            Ok(())
        }
        Commands::Topology => output::print_candidates(&topology.candidate_entities()),
    }
}

fn load_topology(path: Option<&Path>) -> Result<Topology> {
    match path {
        Some(path) => Topology::from_path(path)
            .with_context(|| format!("loading topology {}", path.display())),
        None => Topology::builtin().context("loading built-in topology"),
    }
}

fn build_delegate(config: &DelegateConfig) -> Result<Arc<dyn ShortlistDelegate>> {
    match config.kind {
        DelegateKind::Statistical => Ok(Arc::new(StatisticalShortlist::new(
            config.z_threshold,
            config.min_relative_change,
        ))),
        DelegateKind::Llm => {
            let endpoint = config
                .endpoint
                .clone()
                .context("delegate.endpoint is required for the llm delegate")?;
            let api_key = config.api_key_env.as_deref().and_then(|var| {
                let key = std::env::var(var).ok();
                if key.is_none() {
                    warn!(variable = %var, "API key variable not set, calling without credentials");
                }
                key
            });
            let delegate = HttpShortlist::new(HttpShortlistConfig {
                endpoint,
                model: config.model.clone(),
                api_key,
                request_timeout: Duration::from_secs(config.timeout_secs),
            })
            .context("building shortlist client")?;
            Ok(Arc::new(delegate))
        }
    }
}

async fn run(
    config: DrillConfig,
    topology: Arc<Topology>,
    from: usize,
    only: Option<usize>,
) -> Result<()> {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::DELEGATE).await;
    health_registry.register(components::ENGINE).await;

    let metrics = DrillMetrics::new();
    let run_id = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    let logger = StructuredLogger::new(run_id);

    let store = Arc::new(ParquetStore::new(&config.data_root).with_cache(config.cache_tables));
    let extractor = Extractor::builder()
        .topology(topology.clone())
        .store(store.clone())
        .delegate(build_delegate(&config.delegate)?)
        .delegate_timeout(Duration::from_secs(config.delegate.timeout_secs))
        .fetch_concurrency(config.fetch_concurrency)
        .delegate_concurrency(config.delegate.concurrency)
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    logger.log_startup(DRILL_VERSION, topology.version(), extractor.delegate_name());
    info!(
        data_root = %config.data_root.display(),
        input = %config.input_path.display(),
        output = %config.output_path.display(),
        "metric-drill configured"
    );

    if let Some(port) = config.api_port {
        let state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state).await {
                error!(error = %e, "API server stopped");
            }
        });
    }

    let table = load_intervals(&config.input_path)
        .with_context(|| format!("loading {}", config.input_path.display()))?;
    report_skipped(&table, &metrics, &logger);
    if !tokio::fs::try_exists(&config.data_root).await.unwrap_or(false) {
        warn!(data_root = %config.data_root.display(), "Data root not found, every source will be empty");
        health_registry
            .set_unhealthy(
                components::STORE,
                format!("data root {} not found", config.data_root.display()),
            )
            .await;
    }
    health_registry.set_loaded(table.len()).await;

    let indices: Vec<usize> = match only {
        Some(index) => vec![index],
        None => (from..table.len()).collect(),
    };

    let mut output_file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.output_path)
        .await
        .with_context(|| format!("opening {}", config.output_path.display()))?;

    let (mut analyzed, mut failed) = (0usize, 0usize);
    let mut current_date: Option<String> = None;
    for index in indices {
        let Some(interval) = table.intervals.get(index) else {
            failed += 1;
            output::print_error(&format!(
                "interval index {} out of range for {} intervals",
                index,
                table.len()
            ));
            continue;
        };
        if current_date.as_deref() != Some(interval.date.as_str()) {
            store.clear_cache();
            current_date = Some(interval.date.clone());
        }

        match extractor.analyze(&table.intervals, index).await {
            Ok(analysis) => {
                write_line(&mut output_file, &analysis)
                    .await
                    .with_context(|| format!("writing {}", config.output_path.display()))?;
                output::print_analysis(&analysis);
                health_registry.set_healthy(components::ENGINE).await;
                analyzed += 1;
            }
            Err(e) => {
                error!(uuid = %interval.uuid, index = index, error = %e, "Interval analysis failed");
                health_registry
                    .set_degraded(components::ENGINE, e.to_string())
                    .await;
                failed += 1;
            }
        }
    }

    output_file.flush().await?;
    logger.log_shutdown(analyzed, failed);
    output::print_success(&format!(
        "{} interval(s) analysed, {} failed, output in {}",
        analyzed,
        failed,
        config.output_path.display()
    ));
    Ok(())
}

fn report_skipped(table: &IntervalTable, metrics: &DrillMetrics, logger: &StructuredLogger) {
    if table.skipped.is_empty() {
        return;
    }
    metrics.inc_intervals_skipped(table.skipped.len() as u64);
    for skipped in &table.skipped {
        logger.log_interval_skipped(skipped.row, &skipped.reason);
    }
}

async fn write_line(file: &mut tokio::fs::File, analysis: &IntervalAnalysis) -> Result<()> {
    let mut line = serde_json::to_vec(analysis)?;
    line.push(b'\n');
    file.write_all(&line).await?;
    Ok(())
}
