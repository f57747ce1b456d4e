//! Run configuration

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Which shortlist delegate the coarse tier uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegateKind {
    Statistical,
    Llm,
}

/// Shortlist delegate settings
#[derive(Debug, Clone, Deserialize)]
pub struct DelegateConfig {
    #[serde(default = "default_delegate_kind")]
    pub kind: DelegateKind,

    /// Chat completions URL, required for `llm`
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_delegate_timeout")]
    pub timeout_secs: u64,

    /// Concurrent shortlist calls
    #[serde(default = "default_delegate_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,

    #[serde(default = "default_min_relative_change")]
    pub min_relative_change: f64,
}

/// Extraction run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DrillConfig {
    /// Directory holding one `<date>/metric-parquet` tree per day
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Fault-interval CSV
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,

    /// JSON-lines output, appended to
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Topology override; the built-in registry is used when unset
    #[serde(default)]
    pub topology_path: Option<PathBuf>,

    /// Health/metrics server port; no server when unset
    #[serde(default)]
    pub api_port: Option<u16>,

    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    #[serde(default = "default_cache_tables")]
    pub cache_tables: bool,

    #[serde(default)]
    pub delegate: DelegateConfig,
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_input_path() -> PathBuf {
    PathBuf::from("input.csv")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("anomalies.jsonl")
}

fn default_fetch_concurrency() -> usize {
    8
}

fn default_cache_tables() -> bool {
    true
}

fn default_delegate_kind() -> DelegateKind {
    DelegateKind::Statistical
}

fn default_model() -> String {
    "qwen3:4b-32k".to_string()
}

fn default_delegate_timeout() -> u64 {
    60
}

fn default_delegate_concurrency() -> usize {
    4
}

fn default_z_threshold() -> f64 {
    3.0
}

fn default_min_relative_change() -> f64 {
    0.05
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            kind: default_delegate_kind(),
            endpoint: None,
            model: default_model(),
            api_key_env: None,
            timeout_secs: default_delegate_timeout(),
            concurrency: default_delegate_concurrency(),
            z_threshold: default_z_threshold(),
            min_relative_change: default_min_relative_change(),
        }
    }
}

impl DrillConfig {
    /// Load from an optional file, overridden by `DRILL__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("DRILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        let parsed: DrillConfig = config
            .try_deserialize()
            .context("invalid configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_concurrency == 0 {
            bail!("fetch_concurrency must be at least 1");
        }
        if self.delegate.concurrency == 0 {
            bail!("delegate.concurrency must be at least 1");
        }
        if self.delegate.timeout_secs == 0 {
            bail!("delegate.timeout_secs must be at least 1");
        }
        if self.delegate.z_threshold.is_nan() || self.delegate.z_threshold < 0.0 {
            bail!("delegate.z_threshold must be non-negative");
        }
        if self.delegate.min_relative_change.is_nan() || self.delegate.min_relative_change < 0.0 {
            bail!("delegate.min_relative_change must be non-negative");
        }
        if self.delegate.kind == DelegateKind::Llm && self.delegate.endpoint.is_none() {
            bail!("delegate.endpoint is required for the llm delegate");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let file = write_config("");
        let config = DrillConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.data_root, PathBuf::from("data"));
        assert_eq!(config.fetch_concurrency, 8);
        assert!(config.cache_tables);
        assert!(config.api_port.is_none());
        assert_eq!(config.delegate.kind, DelegateKind::Statistical);
        assert_eq!(config.delegate.timeout_secs, 60);
        assert_eq!(config.delegate.concurrency, 4);
        assert_eq!(config.delegate.z_threshold, 3.0);
        assert_eq!(config.delegate.min_relative_change, 0.05);
    }

    #[test]
    fn test_file_values() {
        let file = write_config(
            r#"
data_root = "/srv/phaseone"
input_path = "/srv/input.csv"
api_port = 9100
cache_tables = false

[delegate]
kind = "llm"
endpoint = "http://localhost:8000/v1/chat/completions"
api_key_env = "SHORTLIST_KEY"
timeout_secs = 15
"#,
        );
        let config = DrillConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.data_root, PathBuf::from("/srv/phaseone"));
        assert_eq!(config.api_port, Some(9100));
        assert!(!config.cache_tables);
        assert_eq!(config.delegate.kind, DelegateKind::Llm);
        assert_eq!(config.delegate.timeout_secs, 15);
        assert_eq!(config.delegate.api_key_env.as_deref(), Some("SHORTLIST_KEY"));
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let file = write_config("fetch_concurrency = \"many\"\n");
        assert!(DrillConfig::load(Some(file.path())).is_err());

        let file = write_config("[delegate]\nkind = \"oracle\"\n");
        assert!(DrillConfig::load(Some(file.path())).is_err());

        let file = write_config("fetch_concurrency = 0\n");
        assert!(DrillConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_llm_requires_endpoint() {
        let file = write_config("[delegate]\nkind = \"llm\"\n");
        let err = DrillConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(DrillConfig::load(Some(Path::new("/nonexistent/drill.toml"))).is_err());
    }
}
