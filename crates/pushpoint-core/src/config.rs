//! Configuration for push-endpoint handling.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PUSHPOINT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/pushpoint/config.toml
//!   3. ~/.config/pushpoint/config.toml

use serde::{Deserialize, Serialize};
use std::net::SocketAddrV4;
use std::path::PathBuf;
use std::time::Duration;

use crate::endpoint::{is_placeholder, ProxySet, PushProxy, MAX_FWT_VERSION};
use crate::guid::ClientGuid;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushpointConfig {
    pub registry: RegistryConfig,
    pub filter: FilterConfig,
    pub local: LocalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Soft cap on canonical entries. Crossing it sweeps idle entries
    /// immediately; entries somebody still holds are never dropped.
    pub max_entries: usize,
    /// How long an unreferenced entry lingers before a sweep may drop it.
    pub idle_grace_secs: u64,
    /// Period of the background sweeper.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Accept private, loopback and link-local proxies. Off outside tests
    /// and LAN setups.
    pub allow_private: bool,
    /// IPv4 addresses never accepted as proxies.
    pub hostile: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Our client GUID in hex. Empty = all-zero GUID.
    pub client_guid: String,
    /// Firewall-to-firewall version we support. 0 = none.
    pub fwt_version: u8,
    /// Our external address as `ip:port`. Empty = unknown.
    pub external_addr: String,
    /// Our push proxies, `ip:port` or `tls:ip:port`.
    pub push_proxies: Vec<String>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            idle_grace_secs: 30,
            sweep_interval_secs: 30,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            client_guid: String::new(),
            fwt_version: 0,
            external_addr: String::new(),
            push_proxies: Vec::new(),
        }
    }
}

impl RegistryConfig {
    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl LocalConfig {
    pub fn guid(&self) -> Result<ClientGuid, ConfigError> {
        if self.client_guid.is_empty() {
            return Ok(ClientGuid::default());
        }
        self.client_guid
            .parse()
            .map_err(|_| ConfigError::InvalidValue("local.client_guid", self.client_guid.clone()))
    }

    pub fn external(&self) -> Result<Option<SocketAddrV4>, ConfigError> {
        if self.external_addr.is_empty() {
            return Ok(None);
        }
        let addr: SocketAddrV4 = self.external_addr.parse().map_err(|_| {
            ConfigError::InvalidValue("local.external_addr", self.external_addr.clone())
        })?;
        if is_placeholder(&addr) {
            return Err(ConfigError::InvalidValue(
                "local.external_addr",
                self.external_addr.clone(),
            ));
        }
        Ok(Some(addr))
    }

    pub fn fwt(&self) -> u8 {
        self.fwt_version.min(MAX_FWT_VERSION)
    }

    pub fn proxies(&self) -> Result<ProxySet, ConfigError> {
        let mut set = ProxySet::new();
        for entry in &self.push_proxies {
            let (tls, addr) = match entry.strip_prefix("tls:") {
                Some(rest) => (true, rest),
                None => (false, entry.as_str()),
            };
            let addr: SocketAddrV4 = addr
                .parse()
                .map_err(|_| ConfigError::InvalidValue("local.push_proxies", entry.clone()))?;
            set.insert(PushProxy::new(addr, tls));
        }
        Ok(set)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("pushpoint")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid {0}: {1:?}")]
    InvalidValue(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PushpointConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            PushpointConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PUSHPOINT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&PushpointConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PUSHPOINT_* overrides read through `var`.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("PUSHPOINT_REGISTRY__MAX_ENTRIES") {
            if let Ok(n) = v.parse() {
                self.registry.max_entries = n;
            }
        }
        if let Some(v) = var("PUSHPOINT_REGISTRY__IDLE_GRACE_SECS") {
            if let Ok(n) = v.parse() {
                self.registry.idle_grace_secs = n;
            }
        }
        if let Some(v) = var("PUSHPOINT_FILTER__ALLOW_PRIVATE") {
            self.filter.allow_private = v == "true" || v == "1";
        }
        if let Some(v) = var("PUSHPOINT_LOCAL__CLIENT_GUID") {
            self.local.client_guid = v;
        }
        if let Some(v) = var("PUSHPOINT_LOCAL__FWT_VERSION") {
            if let Ok(n) = v.parse() {
                self.local.fwt_version = n;
            }
        }
    }
}
