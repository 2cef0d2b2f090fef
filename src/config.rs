use anyhow::Result;
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for review-flow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReviewFlowConfig {
    /// Where work items and comments are kept
    pub storage: StorageConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Invoice line defaults
    pub invoices: InvoiceConfig,
    /// Bulk transition limits
    pub bulk: BulkConfig,
    /// Optimistic concurrency retry settings
    pub concurrency: ConcurrencyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Which backend the CLI opens
    pub backend: StorageBackend,
    /// Root directory for the file backend
    pub path: PathBuf,
    /// SQLite database URL for the sqlite backend
    pub database_url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Default filter directive when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvoiceConfig {
    /// VAT rate applied to invoice lines that don't carry their own
    pub default_vat_rate: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkConfig {
    /// Largest number of work items accepted by one bulk transition
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConcurrencyConfig {
    /// Attempts made by the stale-version retry helper, first one included
    pub max_stale_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReviewFlowConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::File,
                path: PathBuf::from(".review-flow/store"),
                database_url: "sqlite://.review-flow/review-flow.db".to_string(),
                max_connections: 10,
                auto_migrate: true,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
            invoices: InvoiceConfig {
                default_vat_rate: Decimal::new(7, 2), // 7%
            },
            bulk: BulkConfig { max_batch_size: 200 },
            concurrency: ConcurrencyConfig {
                max_stale_retries: 3,
                base_backoff_ms: 25,
                max_backoff_ms: 1000,
            },
        }
    }
}

impl ReviewFlowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (review-flow.toml, .review-flow-rc)
    /// 3. Environment variables (prefixed with REVIEW_FLOW__, nested with __)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`ReviewFlowConfig::load`] with config files looked up in `dir`
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_path = dir.join("review-flow.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".review-flow-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("REVIEW_FLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ReviewFlowConfig, anyhow::Error>> = std::sync::LazyLock::new(|| {
    // Load .env file first
    let _ = ReviewFlowConfig::load_env_file();
    ReviewFlowConfig::load()
});

/// Get the global configuration
pub fn config() -> Result<&'static ReviewFlowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load_without_any_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReviewFlowConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.invoices.default_vat_rate, Decimal::new(7, 2));
        assert_eq!(config.bulk.max_batch_size, 200);
    }

    #[test]
    fn test_file_overrides_defaults_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ReviewFlowConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.bulk.max_batch_size = 25;
        config.save_to_file(dir.path().join("review-flow.toml")).unwrap();

        let loaded = ReviewFlowConfig::load_from(dir.path()).unwrap();
        assert_eq!(loaded.storage.backend, StorageBackend::Memory);
        assert_eq!(loaded.bulk.max_batch_size, 25);
        assert_eq!(loaded.concurrency.max_stale_retries, 3);
    }
}
