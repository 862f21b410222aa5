//! TOML-based configuration persistence for the remote.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\AndroidTVRemote\config.toml`
//! - Linux:    `~/.config/atvremote/config.toml`
//! - macOS:    `~/Library/Application Support/AndroidTVRemote/config.toml`
//!
//! # Example (for beginners)
//!
//! ```toml
//! [general]
//! log_level = "debug"
//! client_name = "Living Room Laptop"
//!
//! [network]
//! discovery_timeout_secs = 5
//!
//! [bluetooth]
//! scan_attempts = 2
//! ```
//!
//! Every field has a `#[serde(default = "...")]`, so the example above is a
//! complete, valid file: anything not listed takes its default.  A missing
//! file is the same as an empty one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::network_discovery::{ANDROID_TV_REMOTE_SERVICE, GOOGLE_CAST_SERVICE};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub bluetooth: BluetoothConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Name the TV shows in its list of paired remotes.
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

/// TLS remote and mDNS settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_service_types")]
    pub service_types: Vec<String>,
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
    #[serde(default = "default_pairing_port")]
    pub pairing_port: u16,
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,
    /// Delay between reconnect attempts after the link drops.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,
    #[serde(default = "default_three")]
    pub connect_retries: u32,
    #[serde(default = "default_three")]
    pub code_attempts: u32,
}

/// Client certificate location.  Relative paths resolve against the working
/// directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialConfig {
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BluetoothConfig {
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,
    #[serde(default = "default_three")]
    pub scan_attempts: u32,
    #[serde(default = "default_three")]
    pub connect_attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    /// Overrides `<config dir>/connection_history.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl NetworkConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

impl BluetoothConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

impl HistoryConfig {
    /// The configured path, or the default inside the config directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoPlatformConfigDir`] when no path is configured
    /// and the platform directory is unknown.
    pub fn resolve_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.path {
            Some(p) => Ok(p.clone()),
            None => Ok(config_dir()?.join("connection_history.json")),
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_client_name() -> String {
    "Android TV Remote".to_string()
}
fn default_service_types() -> Vec<String> {
    vec![
        ANDROID_TV_REMOTE_SERVICE.to_string(),
        GOOGLE_CAST_SERVICE.to_string(),
    ]
}
fn default_discovery_timeout() -> u64 {
    8
}
fn default_pairing_port() -> u16 {
    6467
}
fn default_remote_port() -> u16 {
    6466
}
fn default_reconnect_interval() -> u64 {
    5
}
fn default_three() -> u32 {
    3
}
fn default_cert_path() -> PathBuf {
    PathBuf::from("keys").join("cert.pem")
}
fn default_key_path() -> PathBuf {
    PathBuf::from("keys").join("key.pem")
}
fn default_scan_timeout() -> u64 {
    15
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            client_name: default_client_name(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            service_types: default_service_types(),
            discovery_timeout_secs: default_discovery_timeout(),
            pairing_port: default_pairing_port(),
            remote_port: default_remote_port(),
            reconnect_interval_secs: default_reconnect_interval(),
            connect_retries: default_three(),
            code_attempts: default_three(),
        }
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: default_scan_timeout(),
            scan_attempts: default_three(),
            connect_attempts: default_three(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform path, returning defaults if the file
/// does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from an explicit path.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the platform path.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating the parent directory.
///
/// # Errors
///
/// Same as [`save_config`].
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("AndroidTVRemote"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("atvremote"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("AndroidTVRemote")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("atv-config-{}", Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_app_config_default_has_protocol_ports() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.network.pairing_port, 6467);
        assert_eq!(cfg.network.remote_port, 6466);
    }

    #[test]
    fn test_default_retry_bounds_are_three() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.network.connect_retries, 3);
        assert_eq!(cfg.network.code_attempts, 3);
        assert_eq!(cfg.bluetooth.scan_attempts, 3);
        assert_eq!(cfg.bluetooth.connect_attempts, 3);
    }

    #[test]
    fn test_default_credential_paths_are_under_keys() {
        let cfg = CredentialConfig::default();
        assert_eq!(cfg.cert_path, PathBuf::from("keys").join("cert.pem"));
        assert_eq!(cfg.key_path, PathBuf::from("keys").join("key.pem"));
    }

    #[test]
    fn test_partial_toml_fills_in_defaults() {
        // Arrange
        let text = "[general]\nlog_level = \"debug\"\n\n[bluetooth]\nscan_attempts = 2\n";

        // Act
        let cfg: AppConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.general.log_level, "debug");
        assert_eq!(cfg.general.client_name, "Android TV Remote");
        assert_eq!(cfg.bluetooth.scan_attempts, 2);
        assert_eq!(cfg.bluetooth.scan_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.network.service_types.len(), 2);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let cfg = load_config_from(&temp_path("config.toml")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_creates_directory_and_load_reads_it_back() {
        // Arrange
        let path = temp_path("config.toml");
        let mut cfg = AppConfig::default();
        cfg.network.discovery_timeout_secs = 3;
        cfg.history.path = Some(PathBuf::from("/tmp/history.json"));

        // Act
        save_config_to(&cfg, &path).unwrap();
        let restored = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(restored, cfg);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let path = temp_path("config.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[network\nbroken").unwrap();

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_history_path_override_is_used() {
        let cfg = HistoryConfig {
            path: Some(PathBuf::from("/data/h.json")),
        };
        assert_eq!(cfg.resolve_path().unwrap(), PathBuf::from("/data/h.json"));
    }
}
