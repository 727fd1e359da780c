//! Service configuration
//!
//! Defaults, then an optional JSON file, then `GRYORK_*` environment
//! variables.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use gryork_scheduler::SchedulerConfig;
use gryork_sla::SlaConfig;
use serde::{Deserialize, Serialize};

/// Where cases, trackers and bids live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Sqlite,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "sqlite" => Ok(StorageKind::Sqlite),
            other => bail!("unknown storage backend '{}' (expected memory or sqlite)", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub storage: StorageKind,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sla: SlaConfig,
    #[serde(default)]
    pub audit: AuditSettings,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_page_size() -> usize {
    50
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            storage: StorageKind::default(),
            log_level: default_log_level(),
            scheduler: SchedulerConfig::default(),
            sla: SlaConfig::default(),
            audit: AuditSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `GRYORK_*` variables
    ///
    /// Takes a lookup function so tests do not touch the process env.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("GRYORK_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("GRYORK_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("GRYORK_PORT is not a port: {}", port))?;
        }
        if let Some(dir) = lookup("GRYORK_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("GRYORK_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(secs) = lookup("GRYORK_TICK_SECONDS") {
            self.scheduler.tick_interval_secs = secs
                .parse()
                .with_context(|| format!("GRYORK_TICK_SECONDS is not a number: {}", secs))?;
        }
        if let Some(storage) = lookup("GRYORK_STORAGE") {
            self.storage = storage.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_secs == 0 {
            bail!("scheduler.tick_interval_secs must be positive");
        }
        if self.audit.page_size == 0 || self.audit.page_size > gryork_audit::query::MAX_PAGE_SIZE {
            bail!(
                "audit.page_size must be between 1 and {}",
                gryork_audit::query::MAX_PAGE_SIZE
            );
        }
        self.sla
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid sla config: {}", e))?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("gryork.db")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join("audit.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.scheduler.tick_interval_secs, 300);
        assert_eq!(config.scheduler.dormancy_days, 14);
        assert_eq!(config.audit.page_size, 50);
        config.validate().unwrap();
    }

    #[test]
    fn test_bind_address() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gryork.json");
        std::fs::write(
            &path,
            r#"{"port": 9090, "storage": "sqlite", "scheduler": {"dormancy_days": 21}}"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.storage, StorageKind::Sqlite);
        assert_eq!(config.scheduler.dormancy_days, 21);
        assert_eq!(config.scheduler.tick_interval_secs, 300);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GRYORK_PORT", "7000"),
            ("GRYORK_STORAGE", "SQLITE"),
            ("GRYORK_TICK_SECONDS", "30"),
            ("GRYORK_DATA_DIR", "/var/lib/gryork"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.storage, StorageKind::Sqlite);
        assert_eq!(config.scheduler.tick_interval_secs, 30);
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/gryork/gryork.db"));
    }

    #[test]
    fn test_bad_env_rejected() {
        let mut config = AppConfig::default();
        assert!(config
            .apply_env(|k| (k == "GRYORK_PORT").then(|| "eighty".to_string()))
            .is_err());
        assert!(config
            .apply_env(|k| (k == "GRYORK_STORAGE").then(|| "postgres".to_string()))
            .is_err());
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = AppConfig::default();
        config.audit.page_size = 501;
        assert!(config.validate().is_err());
    }
}
