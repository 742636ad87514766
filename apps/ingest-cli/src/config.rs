//! # Ingestion Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FARMA_DB_PATH=/data/farma.db                                       │
//! │     FARMA_DISCOUNT_FREE_SUPPLIERS=PROFARMA,SANTA CRUZ                  │
//! │     FARMA_MAX_BATCH_FILES=10                                           │
//! │     FARMA_MAX_FILE_SIZE=5242880                                        │
//! │                                                                         │
//! │  2. TOML Config File (--config, or the platform default)               │
//! │     ~/.config/farma-compras/farma.toml (Linux)                         │
//! │     ~/Library/Application Support/br.farma.compras/farma.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "farma.db"
//! max_connections = 5
//! connect_timeout_secs = 30
//!
//! [pricing]
//! discount_free_suppliers = ["PROFARMA", "SANTA CRUZ"]
//!
//! [limits]
//! max_batch_files = 10
//! max_file_size_bytes = 5242880
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{IngestError, IngestResult};
use farma_core::PriceNormalizer;
use farma_db::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

/// Where and how to open the SQLite database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file; created if missing.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("farma.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Pricing Settings
// =============================================================================

/// Discount policy inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Suppliers whose stated unit price is already the net price.
    /// Matched as case-insensitive substrings of the legal name.
    #[serde(default)]
    pub discount_free_suppliers: Vec<String>,
}

// =============================================================================
// Limits
// =============================================================================

/// Upload limits applied before parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Maximum files per batch.
    #[serde(default = "default_max_batch_files")]
    pub max_batch_files: usize,

    /// Maximum size of one XML file.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
}

fn default_max_batch_files() -> usize {
    10
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}

impl Default for LimitSettings {
    fn default() -> Self {
        LimitSettings {
            max_batch_files: default_max_batch_files(),
            max_file_size_bytes: default_max_file_size(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete ingestion configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    #[serde(default)]
    pub limits: LimitSettings,
}

impl IngestConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (explicit path, else the platform default if present)
    /// 3. Environment variables
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load(config_path: Option<PathBuf>) -> IngestResult<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                path => {
                    debug!(?path, "Config file not found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML config file.
    pub fn from_file(path: &Path) -> IngestResult<Self> {
        info!(?path, "Loading config from file");
        let contents = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> IngestResult<()> {
        if self.limits.max_batch_files == 0 {
            return Err(IngestError::Config(
                "max_batch_files must be greater than 0".into(),
            ));
        }
        if self.limits.max_file_size_bytes == 0 {
            return Err(IngestError::Config(
                "max_file_size_bytes must be greater than 0".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(IngestError::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self
            .pricing
            .discount_free_suppliers
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(IngestError::Config(
                "discount_free_suppliers must not contain blank names".into(),
            ));
        }
        Ok(())
    }

    /// Applies `FARMA_*` overrides read through `lookup`.
    ///
    /// `load` passes the process environment; tests pass a map.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("FARMA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(names) = lookup("FARMA_DISCOUNT_FREE_SUPPLIERS") {
            self.pricing.discount_free_suppliers = names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = lookup("FARMA_MAX_BATCH_FILES") {
            match value.parse() {
                Ok(max) => self.limits.max_batch_files = max,
                Err(_) => warn!(value = %value, "Ignoring invalid FARMA_MAX_BATCH_FILES"),
            }
        }

        if let Some(value) = lookup("FARMA_MAX_FILE_SIZE") {
            match value.parse() {
                Ok(max) => self.limits.max_file_size_bytes = max,
                Err(_) => warn!(value = %value, "Ignoring invalid FARMA_MAX_FILE_SIZE"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("br", "farma", "compras")
            .map(|dirs| dirs.config_dir().join("farma.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Database pool configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
    }

    /// Price normalizer seeded with the discount-free supplier list.
    pub fn normalizer(&self) -> PriceNormalizer {
        PriceNormalizer::new(&self.pricing.discount_free_suppliers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.limits.max_batch_files, 10);
        assert_eq!(config.limits.max_file_size_bytes, 5_242_880);
        assert_eq!(config.database.path, PathBuf::from("farma.db"));
        assert!(config.pricing.discount_free_suppliers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: IngestConfig = toml::from_str(
            r#"
            [pricing]
            discount_free_suppliers = ["PROFARMA"]
            "#,
        )
        .unwrap();
        assert_eq!(config.pricing.discount_free_suppliers, vec!["PROFARMA"]);
        assert_eq!(config.limits.max_batch_files, 10);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\npath = \"/data/compras.db\"\n\n[limits]\nmax_batch_files = 3"
        )
        .unwrap();

        let config = IngestConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/data/compras.db"));
        assert_eq!(config.limits.max_batch_files, 3);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = IngestConfig::load(Some(PathBuf::from("/nonexistent/farma.toml"))).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FARMA_DB_PATH", "/tmp/other.db"),
            ("FARMA_DISCOUNT_FREE_SUPPLIERS", "PROFARMA, SANTA CRUZ ,,"),
            ("FARMA_MAX_BATCH_FILES", "4"),
            ("FARMA_MAX_FILE_SIZE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = IngestConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(
            config.pricing.discount_free_suppliers,
            vec!["PROFARMA", "SANTA CRUZ"]
        );
        assert_eq!(config.limits.max_batch_files, 4);
        assert_eq!(config.limits.max_file_size_bytes, 5_242_880);
    }

    #[test]
    fn test_validation() {
        let mut config = IngestConfig::default();
        config.limits.max_batch_files = 0;
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.pricing.discount_free_suppliers = vec!["  ".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_config_and_normalizer() {
        let mut config = IngestConfig::default();
        config.database.max_connections = 2;
        config.pricing.discount_free_suppliers = vec!["PROFARMA".to_string()];

        let db = config.db_config();
        assert_eq!(db.max_connections, 2);
        assert_eq!(db.connect_timeout, Duration::from_secs(30));
        assert!(config.normalizer().is_discount_free("Profarma Distribuidora"));
    }
}
