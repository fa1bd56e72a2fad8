use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::store::{StoreOptions, DEFAULT_DB_NAME, DEFAULT_PAGE_STEP};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ontology: OntologyConfig,
    pub backup: BackupConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub db_name: String,
    pub busy_timeout_ms: u64,
    pub readonly: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OntologyConfig {
    /// Ontology files or directories, merged in order.
    pub sources: Vec<String>,
    pub allow_destructive_migration: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackupConfig {
    pub page_step: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_store_dir().to_string_lossy().into_owned(),
            db_name: DEFAULT_DB_NAME.into(),
            busy_timeout_ms: 5000,
            readonly: false,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            page_step: DEFAULT_PAGE_STEP,
        }
    }
}

/// Returns `~/.ontostore/`, or `./.ontostore` when there is no home directory.
pub fn default_store_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ontostore")
}

/// Returns the default config file path: `~/.ontostore/config.toml`
pub fn default_config_path() -> PathBuf {
    default_store_dir().join("config.toml")
}

impl StoreConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            StoreConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (ONTOSTORE_DB, ONTOSTORE_ONTOLOGY,
    /// ONTOSTORE_LOG_LEVEL). `ONTOSTORE_ONTOLOGY` is a `:`-separated list.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ONTOSTORE_DB") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("ONTOSTORE_ONTOLOGY") {
            self.ontology.sources = val
                .split(':')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(val) = std::env::var("ONTOSTORE_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the data directory, expanding `~` if needed.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    /// The options `Store::open` takes for this configuration.
    pub fn to_options(&self) -> StoreOptions {
        let mut options = StoreOptions::new(self.resolved_data_dir());
        options.db_name = self.storage.db_name.clone();
        options.ontology_sources = self.ontology.sources.iter().map(|s| expand_tilde(s)).collect();
        options.busy_timeout = Duration::from_millis(self.storage.busy_timeout_ms);
        options.readonly = self.storage.readonly;
        options.allow_destructive_migration = self.ontology.allow_destructive_migration;
        options.page_step = self.backup.page_step.max(1);
        options
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = StoreConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.storage.db_name, "meta.db");
        assert_eq!(config.storage.busy_timeout_ms, 5000);
        assert_eq!(config.backup.page_step, DEFAULT_PAGE_STEP);
        assert!(config.storage.data_dir.ends_with(".ontostore"));
        assert!(config.ontology.sources.is_empty());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
data_dir = "/tmp/store"
readonly = true

[ontology]
sources = ["/usr/share/ontologies", "~/extra.ontology"]
"#;
        let config: StoreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.data_dir, "/tmp/store");
        assert!(config.storage.readonly);
        assert_eq!(config.ontology.sources.len(), 2);
        // defaults still apply for unset fields
        assert_eq!(config.storage.db_name, "meta.db");
        assert!(!config.ontology.allow_destructive_migration);

        let options = config.to_options();
        assert_eq!(options.db_path(), PathBuf::from("/tmp/store/meta.db"));
        assert!(options.readonly);
        assert_eq!(options.busy_timeout, Duration::from_secs(5));
        assert_eq!(options.ontology_sources[0], PathBuf::from("/usr/share/ontologies"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = StoreConfig::default();
        std::env::set_var("ONTOSTORE_DB", "/tmp/override");
        std::env::set_var("ONTOSTORE_ONTOLOGY", "/a.ontology:/b");
        std::env::set_var("ONTOSTORE_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.data_dir, "/tmp/override");
        assert_eq!(config.ontology.sources, vec!["/a.ontology", "/b"]);
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("ONTOSTORE_DB");
        std::env::remove_var("ONTOSTORE_ONTOLOGY");
        std::env::remove_var("ONTOSTORE_LOG_LEVEL");
    }
}
