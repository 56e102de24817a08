//! Settings with builder pattern
//!
//! Settings come from a TOML file (`<config_dir>/entity-admin/config.toml` by
//! default). Every section is optional and falls back to sane defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub reconcile: ReconcileConfig,
    pub logging: LoggingConfig,
}

/// SQLite connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Reconciliation behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Child rows without a key are only created when this field is filled in
    pub value_field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter; `RUST_LOG` still takes precedence
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://entity-admin.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            value_field: "VALUE".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

impl Settings {
    /// Create a new builder for Settings
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("entity-admin").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse settings")
    }

    /// Load settings from `path`, or from the default location
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("Settings file does not exist: {}", path.display());
            }
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid settings file: {}", path.display()))
    }
}

/// Builder for Settings
#[derive(Debug)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
        }
    }

    /// Set the database URL
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.settings.database.url = url.into();
        self
    }

    /// Set the connection pool size
    pub fn max_connections(mut self, max: u32) -> Self {
        self.settings.database.max_connections = max;
        self
    }

    /// Set the default designated value field
    pub fn value_field(mut self, field: impl Into<String>) -> Self {
        self.settings.reconcile.value_field = field.into();
        self
    }

    /// Set logging level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.settings.logging.level = level;
        self
    }

    /// Build the final settings
    pub fn build(self) -> Settings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.database.url, "sqlite://entity-admin.db");
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.reconcile.value_field, "VALUE");
        assert_eq!(settings.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [database]
            url = "sqlite::memory:"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(settings.database.url, "sqlite::memory:");
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.reconcile.value_field, "VALUE");
        assert_eq!(settings.logging.level.as_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_builder_pattern() {
        let settings = Settings::builder()
            .database_url("sqlite://test.db")
            .max_connections(1)
            .value_field("URL")
            .log_level(LogLevel::Warn)
            .build();

        assert_eq!(settings.database.url, "sqlite://test.db");
        assert_eq!(settings.database.max_connections, 1);
        assert_eq!(settings.reconcile.value_field, "URL");
        assert_eq!(settings.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let err = Settings::load(Some(Path::new("/nonexistent/entity-admin.toml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
