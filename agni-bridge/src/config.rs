//! Process configuration
//!
//! Handles:
//! - Config directory search (`$AGNI_CONFIG_DIR`, `/etc/agni`, working dir)
//! - Hostname and poll interval from the collectd exec environment
//! - Optional `querier.yaml` (soft-fails to defaults)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const CONFIG_DIR_ENV: &str = "AGNI_CONFIG_DIR";
pub const HOSTNAME_ENV: &str = "COLLECTD_HOSTNAME";
pub const INTERVAL_ENV: &str = "COLLECTD_INTERVAL";

pub const SYSTEM_CONFIG_DIR: &str = "/etc/agni";
pub const QUERIER_FILE: &str = "querier.yaml";
pub const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";
pub const DEFAULT_INTERVAL_SECS: u64 = 20;
pub const FALLBACK_HOSTNAME: &str = "localhost";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid COLLECTD_INTERVAL '{0}': expected a positive whole number of seconds")]
    InvalidInterval(String),
}

/// Directories searched for `plugins.yaml` and `querier.yaml`, in order
pub fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        dirs.push(PathBuf::from(dir));
    }
    dirs.push(PathBuf::from(SYSTEM_CONFIG_DIR));
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }

    dirs
}

/// First regular file named `file` in `dirs`
pub fn find_config_file(file: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().map(|dir| dir.join(file)).find(|candidate| {
        std::fs::metadata(candidate)
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    })
}

/// Hostname tag for `PUTVAL` identifiers
pub fn resolve_hostname(from_env: Option<String>) -> String {
    if let Some(name) = from_env.filter(|h| !h.is_empty()) {
        return name;
    }

    let system = gethostname::gethostname().to_string_lossy().to_string();
    if system.is_empty() {
        FALLBACK_HOSTNAME.to_string()
    } else {
        system
    }
}

/// Poll interval in whole seconds.
///
/// collectd exports `COLLECTD_INTERVAL` as a float (`"20.000"`), so integral
/// floats are accepted as well.
pub fn parse_interval(from_env: Option<&str>) -> Result<u64, ConfigError> {
    let raw = match from_env.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_INTERVAL_SECS),
        Some(raw) => raw,
    };
    let invalid = || ConfigError::InvalidInterval(raw.to_string());

    let secs = match raw.parse::<u64>() {
        Ok(secs) => secs,
        Err(_) => {
            let secs = raw.parse::<f64>().map_err(|_| invalid())?;
            if !secs.is_finite() || secs.fract() != 0.0 || secs < 0.0 || secs > u32::MAX as f64 {
                return Err(invalid());
            }
            secs as u64
        }
    };

    if secs == 0 {
        return Err(invalid());
    }
    Ok(secs)
}

/// Hostname and interval shared by every poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub hostname: String,
    pub interval_secs: u64,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let interval = std::env::var(INTERVAL_ENV).ok();
        Ok(Self {
            hostname: resolve_hostname(std::env::var(HOSTNAME_ENV).ok()),
            interval_secs: parse_interval(interval.as_deref())?,
        })
    }
}

/// `querier.yaml` contents
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuerierConfig {
    #[serde(default)]
    pub url: String,
    /// HTTP timeout for a single query; unbounded when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for QuerierConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROMETHEUS_URL.to_string(),
            timeout_secs: None,
        }
    }
}

impl QuerierConfig {
    /// Parse `querier.yaml` text, falling back to defaults on any problem
    pub fn from_yaml(text: &str) -> Self {
        match serde_yaml::from_str::<QuerierConfig>(text) {
            Ok(mut config) => {
                if config.url.trim().is_empty() {
                    config.url = DEFAULT_PROMETHEUS_URL.to_string();
                }
                config
            }
            Err(e) => {
                warn!("Invalid {}: {}, using defaults", QUERIER_FILE, e);
                Self::default()
            }
        }
    }

    /// Load `querier.yaml` from the config directories; never fails
    pub async fn load(dirs: &[PathBuf]) -> Self {
        match find_config_file(QUERIER_FILE, dirs) {
            Some(path) => Self::load_file(&path).await,
            None => {
                debug!("No {} found, using {}", QUERIER_FILE, DEFAULT_PROMETHEUS_URL);
                Self::default()
            }
        }
    }

    async fn load_file(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::from_yaml(&text),
            Err(e) => {
                warn!("Failed to read {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
