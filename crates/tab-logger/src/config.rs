use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use activity_log::DrainConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_realm")]
    pub realm: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub drain: DrainSettings,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub bridge: BridgeSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            realm: default_realm(),
            logging: LoggingConfig::default(),
            sink: SinkConfig::default(),
            drain: DrainSettings::default(),
            vault: VaultConfig::default(),
            bridge: BridgeSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    File,
    Http,
}

#[derive(Debug, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    /// Used by the file sink.
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
    /// Used by the HTTP sink.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            path: default_log_path(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DrainSettings {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            max_attempts: default_max_attempts(),
            high_water_mark: default_high_water_mark(),
        }
    }
}

impl DrainSettings {
    /// A `high_water_mark` of zero turns the backlog warning off.
    pub fn to_drain_config(&self) -> DrainConfig {
        DrainConfig {
            period: Duration::from_millis(self.period_ms),
            max_attempts: self.max_attempts,
            high_water_mark: self.high_water_mark,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultKind {
    #[default]
    File,
    /// Credentials live only as long as the process.
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub kind: VaultKind,
    #[serde(default = "default_vault_path")]
    pub path: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kind: VaultKind::default(),
            path: default_vault_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    #[serde(default = "default_origin_allowlist")]
    pub origin_allowlist: Vec<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
            origin_allowlist: default_origin_allowlist(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_realm() -> String {
    "Search Task Logger".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_path() -> PathBuf {
    PathBuf::from(".firefox_history.log")
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_period_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    1
}

fn default_high_water_mark() -> usize {
    10_000
}

fn default_vault_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_listen() -> String {
    "127.0.0.1:18790".to_string()
}

fn default_origin_allowlist() -> Vec<String> {
    host_bridge::DEFAULT_ALLOWLIST
        .iter()
        .map(|pattern| pattern.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// A missing file yields the default configuration and a warning, so the
/// daemon can start before any config has been written.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(config)
}
