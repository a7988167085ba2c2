//! Configuration loading and validation

use anyhow::{bail, Result};
use fabricpoll_poller::PollerConfig;
use fabricpoll_redfish::RedfishEndpoint;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the status API
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Serve the status API
    #[serde(default = "default_true")]
    pub api_enabled: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_enabled: true,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
    true
}

/// Which key-value store backend holds crawled state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Dir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    /// Record directory for the `dir` backend
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

fn default_backend() -> StoreBackend {
    StoreBackend::Dir
}

fn default_store_path() -> String {
    "./fabricpoll-data".to_string()
}

/// One polled endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(flatten)]
    pub poller: PollerConfig,
    /// Redfish service base URL
    pub url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_timeout() -> u64 {
    fabricpoll_redfish::http::DEFAULT_TIMEOUT_SECS
}

impl EndpointConfig {
    pub fn to_redfish_endpoint(&self) -> RedfishEndpoint {
        RedfishEndpoint {
            base_url: self.url.clone(),
            timeout_secs: self.timeout_secs,
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl Config {
    /// Reject configurations no poller could start from
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            let poller = &endpoint.poller;
            if !names.insert(poller.name.as_str()) {
                bail!("duplicate endpoint name: {}", poller.name);
            }
            poller.device_kind()?;
            if poller.interval_secs == 0 {
                bail!("{}: interval_secs must be positive", poller.name);
            }
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), endpoints = config.endpoints.len(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save a sample configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        daemon: DaemonConfig::default(),
        store: StoreConfig::default(),
        endpoints: vec![EndpointConfig {
            poller: PollerConfig {
                stale_after_secs: Some(3600),
                ..PollerConfig::new("essd-0", "essd")
            },
            url: "http://10.1.0.20:5000".to_string(),
            timeout_secs: default_timeout(),
            username: None,
            password: None,
        }],
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoints_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [store]
            backend = "memory"

            [[endpoint]]
            name = "essd-0"
            kind = "essd"
            url = "http://10.1.0.20:5000"
            stale_after_secs = 600

            [[endpoint]]
            name = "essd-1"
            kind = "ESSD"
            url = "http://10.1.0.21:5000"
            interval_secs = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.daemon.bind, "0.0.0.0:8080");
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].poller.interval_secs, 60);
        assert_eq!(config.endpoints[0].poller.stale_after_secs, Some(600));
        assert_eq!(config.endpoints[0].timeout_secs, 1);
        assert_eq!(config.endpoints[1].poller.interval_secs, 15);
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_kind_fails_validation() {
        let config: Config = toml::from_str(
            r#"
            [[endpoint]]
            name = "sw-0"
            kind = "brocade"
            url = "http://10.1.0.30"
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("brocade"));
    }

    #[test]
    fn test_duplicate_names_fail_validation() {
        let endpoint = EndpointConfig {
            poller: PollerConfig::new("essd-0", "essd"),
            url: "http://10.1.0.20".to_string(),
            timeout_secs: 1,
            username: None,
            password: None,
        };
        let config = Config {
            endpoints: vec![endpoint.clone(), endpoint],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_roundtrips() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("fabricpoll.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].poller.name, "essd-0");
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/fabricpoll.toml")).unwrap();
        assert!(config.endpoints.is_empty());
        assert_eq!(config.store.backend, StoreBackend::Dir);
    }
}
