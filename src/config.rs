// ⚙️ Configuration - YAML file + environment overrides
//
// Every field has a default, so an absent file is a valid configuration.
// Environment variables win over the file:
//   BIN_CATALOG_DB, BIN_CATALOG_BIND, BIN_CATALOG_LOG, BIN_CATALOG_ACTOR

use crate::engine::EngineSettings;
use crate::plan_items::{ItemFormat, DEFAULT_MERCHANT_ID_DIGITS};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("bin_catalog.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Fixed width of MERCHANT_ID plan items
    pub merchant_id_digits: usize,
    /// Upper bound for any page size
    pub page_limit_max: usize,
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            merchant_id_digits: DEFAULT_MERCHANT_ID_DIGITS,
            page_limit_max: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. "info" or "bin_catalog=debug"
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ============================================================================
// CATALOG CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub rules: RulesConfig,
    pub logging: LoggingConfig,
    /// Actor recorded when the caller does not identify itself
    pub default_actor: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            rules: RulesConfig::default(),
            logging: LoggingConfig::default(),
            default_actor: "system".to_string(),
        }
    }
}

impl CatalogConfig {
    /// Load from an optional YAML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => CatalogConfig::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: CatalogConfig =
            serde_yaml::from_str(content).context("Failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Widths and limits must be positive
    pub fn validate(&self) -> Result<()> {
        if self.rules.merchant_id_digits == 0 {
            bail!("rules.merchant_id_digits must be at least 1");
        }
        if self.rules.page_limit_max == 0 {
            bail!("rules.page_limit_max must be at least 1");
        }
        Ok(())
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("BIN_CATALOG_DB") {
            self.database.path = PathBuf::from(db);
        }
        if let Some(bind) = lookup("BIN_CATALOG_BIND") {
            self.server.bind = bind;
        }
        if let Some(level) = lookup("BIN_CATALOG_LOG") {
            self.logging.level = level;
        }
        if let Some(actor) = lookup("BIN_CATALOG_ACTOR") {
            self.default_actor = actor;
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            item_format: ItemFormat {
                merchant_id_digits: self.rules.merchant_id_digits,
            },
            page_limit_max: self.rules.page_limit_max,
        }
    }
}

// ============================================================================
// LOGGING
// ============================================================================

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CatalogConfig::default();
        assert_eq!(config.rules.merchant_id_digits, 15);
        assert_eq!(config.default_actor, "system");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "rules:\n  merchant_id_digits: 10\nlogging:\n  json: true\n";
        let config = CatalogConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.rules.merchant_id_digits, 10);
        assert_eq!(config.rules.page_limit_max, 500);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(CatalogConfig::from_yaml("rules: [1, 2").is_err());
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("BIN_CATALOG_DB", "/tmp/catalog.db"),
            ("BIN_CATALOG_ACTOR", "batch"),
        ]
        .into_iter()
        .collect();

        let mut config = CatalogConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/catalog.db"));
        assert_eq!(config.default_actor, "batch");
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_engine_settings() {
        let mut config = CatalogConfig::default();
        config.rules.merchant_id_digits = 8;
        let settings = config.engine_settings();
        assert_eq!(settings.item_format.merchant_id_digits, 8);
        assert_eq!(settings.page_limit_max, 500);
    }

    #[test]
    fn test_zero_widths_rejected() {
        let err = CatalogConfig::from_yaml("rules:\n  merchant_id_digits: 0\n").unwrap_err();
        assert!(err.to_string().contains("merchant_id_digits"));
        assert!(CatalogConfig::from_yaml("rules:\n  page_limit_max: 0\n").is_err());

        let path = std::env::temp_dir().join(format!("bin-catalog-{}.yaml", uuid::Uuid::new_v4()));
        fs::write(&path, "rules:\n  merchant_id_digits: 0\n").unwrap();
        let loaded = CatalogConfig::load(Some(&path));
        fs::remove_file(&path).unwrap();
        assert!(loaded.is_err());
    }
}
