//! Configuration management for the model lifecycle service
//!
//! This crate provides [`ServiceConfig`], assembled with the `config` crate
//! from built-in defaults, an optional file and `MLOPS__*` environment
//! variables, in that order of precedence.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "MLOPS";

/// Separator between prefix, section and key in environment overrides
pub const ENV_SEPARATOR: &str = "__";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The assembled configuration is not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener addresses
    pub server: ServerConfig,
    /// Lifecycle limits and timeouts
    pub lifecycle: LifecycleConfig,
    /// Dataset and model archive locations
    pub storage: StorageConfig,
    /// Experiment tracker connection
    pub tracker: TrackerConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// Listener addresses for both transports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// REST listener address
    pub rest_addr: String,
    /// gRPC listener address
    pub grpc_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: "0.0.0.0:8000".to_string(),
            grpc_addr: "0.0.0.0:50051".to_string(),
        }
    }
}

/// Job limits and timeouts of the lifecycle service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Maximum number of training jobs running at once
    pub max_concurrent_jobs: usize,
    /// Default bound on a fit
    pub training_timeout_secs: u64,
    /// Bound on a predict call
    pub prediction_timeout_secs: u64,
    /// Bound on a dataset load
    pub dataset_timeout_secs: u64,
    /// Bound on each experiment tracker call
    pub gateway_timeout_secs: u64,
    /// Serve the previous estimator while a retrain is running
    pub serve_stale_during_retrain: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: common::utils::get_num_cpus().max(1),
            training_timeout_secs: 300,
            prediction_timeout_secs: 30,
            dataset_timeout_secs: 30,
            gateway_timeout_secs: 5,
            serve_stale_during_retrain: false,
        }
    }
}

impl LifecycleConfig {
    /// Default training timeout as a duration
    pub fn training_timeout(&self) -> Duration {
        Duration::from_secs(self.training_timeout_secs)
    }

    /// Prediction timeout as a duration
    pub fn prediction_timeout(&self) -> Duration {
        Duration::from_secs(self.prediction_timeout_secs)
    }

    /// Dataset load timeout as a duration
    pub fn dataset_timeout(&self) -> Duration {
        Duration::from_secs(self.dataset_timeout_secs)
    }

    /// Tracker call timeout as a duration
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }
}

/// Storage locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `<id>.csv` / `<id>.json` datasets
    pub datasets_dir: PathBuf,
    /// Directory for archived models, archiving disabled when unset
    pub models_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            datasets_dir: PathBuf::from("./datasets"),
            models_dir: None,
        }
    }
}

/// Experiment tracker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Base URL of the tracker, tracking disabled when unset
    pub endpoint: Option<String>,
    /// Project (experiment) name runs are filed under
    pub project: String,
    /// Bearer token sent with every call
    pub api_key: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            project: "MLOps".to_string(),
            api_key: None,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Directory for daily rolling log files
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from defaults, an optional file and the
    /// `MLOPS__SECTION__KEY` environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Same as [`ServiceConfig::load`] with a custom environment prefix
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ServiceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let cfg: ServiceConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        self.rest_addr()?;
        self.grpc_addr()?;

        let lifecycle = &self.lifecycle;
        if lifecycle.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid("lifecycle.max_concurrent_jobs must be at least 1".into()));
        }
        for (name, value) in [
            ("training_timeout_secs", lifecycle.training_timeout_secs),
            ("prediction_timeout_secs", lifecycle.prediction_timeout_secs),
            ("dataset_timeout_secs", lifecycle.dataset_timeout_secs),
            ("gateway_timeout_secs", lifecycle.gateway_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("lifecycle.{} must be positive", name)));
            }
        }

        if let Some(endpoint) = &self.tracker.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "tracker.endpoint must be an http(s) URL: {}",
                    endpoint
                )));
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".into()));
        }

        Ok(())
    }

    /// Parsed REST listener address
    pub fn rest_addr(&self) -> Result<SocketAddr> {
        parse_addr("server.rest_addr", &self.server.rest_addr)
    }

    /// Parsed gRPC listener address
    pub fn grpc_addr(&self) -> Result<SocketAddr> {
        parse_addr("server.grpc_addr", &self.server.grpc_addr)
    }
}

fn parse_addr(name: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{} '{}': {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // No other test sets variables under this prefix.
    const TEST_PREFIX: &str = "MLOPS_CFG_UNIT";

    #[test]
    fn test_defaults() {
        let cfg = ServiceConfig::load_with_prefix(None, TEST_PREFIX).unwrap();
        assert_eq!(cfg.server.rest_addr, "0.0.0.0:8000");
        assert_eq!(cfg.server.grpc_addr, "0.0.0.0:50051");
        assert_eq!(cfg.lifecycle.training_timeout_secs, 300);
        assert_eq!(cfg.lifecycle.prediction_timeout_secs, 30);
        assert!(cfg.lifecycle.max_concurrent_jobs >= 1);
        assert!(!cfg.lifecycle.serve_stale_during_retrain);
        assert_eq!(cfg.storage.datasets_dir, PathBuf::from("./datasets"));
        assert!(cfg.storage.models_dir.is_none());
        assert_eq!(cfg.tracker.project, "MLOps");
        assert!(cfg.tracker.endpoint.is_none());
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[lifecycle]\nmax_concurrent_jobs = 3\nserve_stale_during_retrain = true\n\n[tracker]\nendpoint = \"http://tracker:5000\"\n"
        )
        .unwrap();

        let cfg = ServiceConfig::load_with_prefix(Some(file.path()), TEST_PREFIX).unwrap();
        assert_eq!(cfg.lifecycle.max_concurrent_jobs, 3);
        assert!(cfg.lifecycle.serve_stale_during_retrain);
        assert_eq!(cfg.lifecycle.training_timeout_secs, 300);
        assert_eq!(cfg.tracker.endpoint.as_deref(), Some("http://tracker:5000"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let prefix = "MLOPS_CFG_ENV_TEST";
        std::env::set_var(format!("{}__LIFECYCLE__PREDICTION_TIMEOUT_SECS", prefix), "7");
        std::env::set_var(format!("{}__SERVER__REST_ADDR", prefix), "127.0.0.1:9000");

        let cfg = ServiceConfig::load_with_prefix(None, prefix).unwrap();
        assert_eq!(cfg.lifecycle.prediction_timeout_secs, 7);
        assert_eq!(cfg.rest_addr().unwrap().port(), 9000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut cfg = ServiceConfig::default();
        assert!(cfg.validate().is_ok());

        cfg.lifecycle.max_concurrent_jobs = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = ServiceConfig::default();
        cfg.lifecycle.training_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ServiceConfig::default();
        cfg.server.grpc_addr = "not an address".into();
        assert!(cfg.validate().is_err());

        let mut cfg = ServiceConfig::default();
        cfg.tracker.endpoint = Some("tracker:5000".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = ServiceConfig::load_with_prefix(Some(Path::new("/nonexistent/mlops.toml")), TEST_PREFIX);
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
