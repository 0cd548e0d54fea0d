//! Runtime configuration for the offline layer.

use std::path::PathBuf;
use std::time::Duration;

use crate::store::default_db_path;
use crate::sync_engine::DEFAULT_MAX_REJECTIONS;
use crate::sync_worker::DEFAULT_PROBE_INTERVAL;

pub const ENV_API_URL: &str = "BACKOFFICE_API_URL";
pub const ENV_API_KEY: &str = "BACKOFFICE_API_KEY";
pub const ENV_DATA_DIR: &str = "BACKOFFICE_DATA_DIR";
pub const ENV_CATALOG_COLLECTION: &str = "BACKOFFICE_CATALOG_COLLECTION";
pub const ENV_PROBE_INTERVAL_SECS: &str = "BACKOFFICE_PROBE_INTERVAL_SECS";
pub const ENV_MAX_REJECTIONS: &str = "BACKOFFICE_MAX_REJECTIONS";

const DB_FILE: &str = "offline.db";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfflineConfig {
    /// Backend base URL; REST and function paths are appended to it.
    pub api_url: String,
    pub api_key: Option<String>,
    /// Directory holding the local database. `None` uses the OS data dir.
    pub data_dir: Option<PathBuf>,
    /// Remote collection mirrored by the catalog cache.
    pub catalog_collection: String,
    pub probe_interval: Duration,
    pub max_rejections: u32,
    pub request_timeout: Duration,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:54321".to_string(),
            api_key: None,
            data_dir: None,
            catalog_collection: "products".to_string(),
            probe_interval: DEFAULT_PROBE_INTERVAL,
            max_rejections: DEFAULT_MAX_REJECTIONS,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl OfflineConfig {
    /// Defaults overridden by `BACKOFFICE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            config.api_url = non_empty(ENV_API_URL, url)?;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            config.api_key = Some(key).filter(|k| !k.trim().is_empty());
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            config.data_dir = Some(PathBuf::from(non_empty(ENV_DATA_DIR, dir)?));
        }
        if let Some(collection) = lookup(ENV_CATALOG_COLLECTION) {
            config.catalog_collection = non_empty(ENV_CATALOG_COLLECTION, collection)?;
        }
        if let Some(secs) = lookup(ENV_PROBE_INTERVAL_SECS) {
            config.probe_interval = Duration::from_secs(positive(ENV_PROBE_INTERVAL_SECS, &secs)?);
        }
        if let Some(max) = lookup(ENV_MAX_REJECTIONS) {
            let max = positive(ENV_MAX_REJECTIONS, &max)?;
            config.max_rejections = u32::try_from(max).map_err(|_| ConfigError::InvalidNumber {
                var: ENV_MAX_REJECTIONS,
                value: max.to_string(),
            })?;
        }

        Ok(config)
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_catalog_collection(mut self, collection: impl Into<String>) -> Self {
        self.catalog_collection = collection.into();
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_max_rejections(mut self, max: u32) -> Self {
        self.max_rejections = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Where the local database lives.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.join(DB_FILE)),
            None => default_db_path(),
        }
    }
}

fn non_empty(var: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty { var })
    } else {
        Ok(value.trim().to_string())
    }
}

fn positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = OfflineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, OfflineConfig::default());
        assert_eq!(config.probe_interval, Duration::from_secs(30));
        assert_eq!(config.max_rejections, 3);
    }

    #[test]
    fn env_overrides() {
        let config = OfflineConfig::from_lookup(lookup(&[
            (ENV_API_URL, "https://api.example.test"),
            (ENV_API_KEY, "anon"),
            (ENV_DATA_DIR, "/var/lib/backoffice"),
            (ENV_CATALOG_COLLECTION, "produtos"),
            (ENV_PROBE_INTERVAL_SECS, "5"),
            (ENV_MAX_REJECTIONS, " 7 "),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://api.example.test");
        assert_eq!(config.api_key.as_deref(), Some("anon"));
        assert_eq!(config.catalog_collection, "produtos");
        assert_eq!(config.probe_interval, Duration::from_secs(5));
        assert_eq!(config.max_rejections, 7);
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/var/lib/backoffice/offline.db")
        );
    }

    #[test]
    fn blank_api_key_is_none() {
        let config = OfflineConfig::from_lookup(lookup(&[(ENV_API_KEY, "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn rejects_bad_numbers() {
        for bad in ["0", "-1", "soon", ""] {
            let err = OfflineConfig::from_lookup(lookup(&[(ENV_PROBE_INTERVAL_SECS, bad)])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidNumber { var: ENV_PROBE_INTERVAL_SECS, .. }));
        }
        assert!(OfflineConfig::from_lookup(lookup(&[(ENV_MAX_REJECTIONS, "99999999999")])).is_err());
    }

    #[test]
    fn rejects_empty_strings() {
        let err = OfflineConfig::from_lookup(lookup(&[(ENV_API_URL, " ")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty { var: ENV_API_URL });
    }

    #[test]
    fn builders_override_defaults() {
        let config = OfflineConfig::default()
            .with_api_url("http://backend")
            .with_max_rejections(1)
            .with_probe_interval(Duration::from_secs(1));
        assert_eq!(config.api_url, "http://backend");
        assert_eq!(config.max_rejections, 1);
        assert_eq!(config.probe_interval, Duration::from_secs(1));
    }
}
