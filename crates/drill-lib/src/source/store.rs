//! Columnar table access
//!
//! Adapters describe what they need as a [`TableQuery`]; a [`TableStore`]
//! turns it into flat rows. A table that does not exist is `Ok(None)`,
//! never an error.

use crate::error::SourceError;
use async_trait::async_trait;
use dashmap::DashMap;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Column holding nanosecond timestamps in every metric table
pub const TIMESTAMP_COLUMN: &str = "timestamp_ns";

/// Projection of one metric table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    /// Path relative to the store root
    pub path: PathBuf,
    pub value_column: String,
    pub entity_column: Option<String>,
    pub host_column: Option<String>,
}

impl TableQuery {
    pub fn new(path: impl Into<PathBuf>, value_column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value_column: value_column.into(),
            entity_column: None,
            host_column: None,
        }
    }

    pub fn entity_column(mut self, column: impl Into<String>) -> Self {
        self.entity_column = Some(column.into());
        self
    }

    pub fn host_column(mut self, column: impl Into<String>) -> Self {
        self.host_column = Some(column.into());
        self
    }
}

/// One non-null observation read from a table
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub timestamp_ns: i64,
    pub value: f64,
    pub entity: Option<String>,
    pub host: Option<String>,
}

/// Read access to the time-series tables
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Rows for `query`, or `None` when the table does not exist
    async fn read(&self, query: &TableQuery) -> Result<Option<Vec<MetricRow>>, SourceError>;
}

/// Parquet files below a root directory, cached per path
pub struct ParquetStore {
    root: PathBuf,
    cache: DashMap<PathBuf, Arc<DataFrame>>,
    cache_enabled: bool,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: DashMap::new(),
            cache_enabled: true,
        }
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop cached tables, e.g. when moving to another partition date
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_tables(&self) -> usize {
        self.cache.len()
    }

    async fn load(&self, relative: &Path) -> Result<Option<Arc<DataFrame>>, SourceError> {
        if let Some(frame) = self.cache.get(relative) {
            return Ok(Some(frame.clone()));
        }

        let full = self.root.join(relative);
        if !tokio::fs::try_exists(&full).await.unwrap_or(false) {
            debug!(path = %full.display(), "Table not present");
            return Ok(None);
        }

        let path = full.clone();
        let frame = tokio::task::spawn_blocking(move || -> Result<DataFrame, SourceError> {
            let file = std::fs::File::open(&path).map_err(|e| SourceError::Read {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            ParquetReader::new(file).finish().map_err(|e| SourceError::Read {
                path: path.clone(),
                reason: e.to_string(),
            })
        })
        .await
        .map_err(|e| SourceError::Read {
            path: full.clone(),
            reason: e.to_string(),
        })??;

        debug!(path = %full.display(), rows = frame.height(), "Loaded table");
        let frame = Arc::new(frame);
        if self.cache_enabled {
            self.cache.insert(relative.to_path_buf(), frame.clone());
        }
        Ok(Some(frame))
    }
}

#[async_trait]
impl TableStore for ParquetStore {
    async fn read(&self, query: &TableQuery) -> Result<Option<Vec<MetricRow>>, SourceError> {
        match self.load(&query.path).await? {
            Some(frame) => rows_from_frame(&frame, query).map(Some),
            None => Ok(None),
        }
    }
}

/// Frames held in memory, keyed by relative path
#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<PathBuf, Arc<DataFrame>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, frame: DataFrame) {
        self.tables.insert(path.into(), Arc::new(frame));
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn read(&self, query: &TableQuery) -> Result<Option<Vec<MetricRow>>, SourceError> {
        let frame = match self.tables.get(&query.path) {
            Some(frame) => frame.clone(),
            None => return Ok(None),
        };
        rows_from_frame(&frame, query).map(Some)
    }
}

/// Flatten the queried columns, dropping rows with a null timestamp or value
pub fn rows_from_frame(frame: &DataFrame, query: &TableQuery) -> Result<Vec<MetricRow>, SourceError> {
    let polars_err = |e: PolarsError| SourceError::Read {
        path: query.path.clone(),
        reason: e.to_string(),
    };
    let column = |name: &str| {
        frame.column(name).map_err(|_| SourceError::MissingColumn {
            path: query.path.clone(),
            column: name.to_string(),
        })
    };

    let timestamps = column(TIMESTAMP_COLUMN)?
        .cast(&DataType::Int64)
        .map_err(polars_err)?;
    let values = column(query.value_column.as_str())?
        .cast(&DataType::Float64)
        .map_err(polars_err)?;
    let entities = match query.entity_column {
        Some(ref name) => Some(column(name.as_str())?.cast(&DataType::String).map_err(polars_err)?),
        None => None,
    };
    let hosts = match query.host_column {
        Some(ref name) => Some(column(name.as_str())?.cast(&DataType::String).map_err(polars_err)?),
        None => None,
    };

    let timestamps = timestamps.i64().map_err(polars_err)?;
    let values = values.f64().map_err(polars_err)?;
    let entities = entities.as_ref().map(|s| s.str()).transpose().map_err(polars_err)?;
    let hosts = hosts.as_ref().map(|s| s.str()).transpose().map_err(polars_err)?;

    let mut rows = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        let (Some(timestamp_ns), Some(value)) = (timestamps.get(idx), values.get(idx)) else {
            continue;
        };
        rows.push(MetricRow {
            timestamp_ns,
            value,
            entity: entities.and_then(|ca| ca.get(idx)).map(str::to_string),
            host: hosts.and_then(|ca| ca.get(idx)).map(str::to_string),
        });
    }
    Ok(rows)
}
