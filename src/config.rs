//! TOML configuration for the infrascope service.
//!
//! Lookup order: the file named by `INFRASCOPE_CONFIG`, then `./infrascope.toml`,
//! then compiled-in defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::catalog::{MetricCatalog, ThresholdOverride};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "INFRASCOPE_CONFIG";
/// Config file picked up from the working directory.
pub const LOCAL_CONFIG: &str = "infrascope.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-metric threshold overrides keyed by metric name.
    #[serde(default)]
    pub thresholds: IndexMap<String, ThresholdOverride>,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .batch
            .validate()
            .with_context(|| format!("invalid [batch] section in {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{CONFIG_ENV} set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Build the metric catalog with this config's threshold overrides applied.
    pub fn catalog(&self) -> Result<MetricCatalog> {
        MetricCatalog::with_overrides(&self.thresholds).context("invalid [thresholds] section")
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// SQLite database holding ingested points.
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            db_path: PathBuf::from("data/infrascope.db"),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub min_points: usize,
    pub max_points: usize,
    pub default_points: usize,
    /// Replay history through the live evaluator instead of an isolated one.
    pub shared_history: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_points: 10,
            max_points: 200,
            default_points: 50,
            shared_history: false,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_points == 0 || self.min_points > self.max_points {
            anyhow::bail!(
                "min_points ({}) must be between 1 and max_points ({})",
                self.min_points,
                self.max_points
            );
        }
        if !(self.min_points..=self.max_points).contains(&self.default_points) {
            anyhow::bail!(
                "default_points ({}) must lie within {}..={}",
                self.default_points,
                self.min_points,
                self.max_points
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::catalog::MetricRule;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.bind, "0.0.0.0:8000");
        assert_eq!(cfg.server.db_path, PathBuf::from("data/infrascope.db"));
        assert_eq!(cfg.batch.min_points, 10);
        assert_eq!(cfg.batch.max_points, 200);
        assert_eq!(cfg.batch.default_points, 50);
        assert!(!cfg.batch.shared_history);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.thresholds.is_empty());
        assert!(cfg.batch.validate().is_ok());
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[server]
bind = "127.0.0.1:9000"

[batch]
min_points = 5
shared_history = true

[logging]
level = "debug"
json = true

[thresholds.cpu_usage]
warning = 75
critical = 95

[thresholds.network_in_kbps]
warning_factor = 1.8
"#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(cfg.server.db_path, PathBuf::from("data/infrascope.db"));
        assert_eq!(cfg.batch.min_points, 5);
        assert_eq!(cfg.batch.max_points, 200);
        assert!(cfg.batch.shared_history);
        assert!(cfg.logging.json);

        let catalog = cfg.catalog().unwrap();
        match catalog.rule("cpu_usage") {
            Some(MetricRule::Absolute(r)) => assert_eq!((r.warning, r.critical), (75.0, 95.0)),
            other => panic!("unexpected rule: {other:?}"),
        }
        match catalog.rule("network_in_kbps") {
            Some(MetricRule::Relative(r)) => assert_eq!(r.warning_factor, 1.8),
            other => panic!("unexpected rule: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_threshold_key_is_rejected() {
        let toml_str = r#"
[thresholds.cpu_usage]
warn = 75
"#;
        assert!(toml::from_str::<AppConfig>(toml_str).is_err());
    }

    #[test]
    fn test_bad_batch_bounds() {
        let batch = BatchConfig {
            min_points: 50,
            max_points: 20,
            ..Default::default()
        };
        assert!(batch.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("infrascope.toml");
        std::fs::write(&path, "[batch]\nmax_points = 100\n").unwrap();

        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.batch.max_points, 100);

        let missing = dir.path().join("missing.toml");
        assert!(AppConfig::load(&missing).is_err());
    }
}
