//! TOML-based configuration for the window management service.
//!
//! The file is looked up at the path given on the command line (or in
//! `WMS_CONFIG`), otherwise in the platform config directory:
//! - Linux:    `$XDG_CONFIG_HOME/wms/config.toml` or `~/.config/wms/config.toml`
//! - macOS:    `~/Library/Application Support/WMS/config.toml`
//! - Windows:  `%APPDATA%\WMS\config.toml`
//!
//! # Example
//!
//! ```toml
//! [server]
//! log_level = "debug"
//! device_type = "phone"
//! rotation_offset_degrees = 0
//!
//! [timing]
//! dirty_flush_ms = 10
//!
//! [[screens]]
//! name = "builtin"
//! width = 1080
//! height = 2340
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default = "...")]` helper, so a missing file,
//! a missing section or a missing key all fall back to the same defaults.
//! Older config files keep working when new keys are added.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

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

/// Top-level service configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Screens the headless backend reports at startup.
    #[serde(default = "default_screens")]
    pub screens: Vec<ScreenEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Form factor.  Sensor rotation only applies to `"phone"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Sensor mounting offset relative to the panel, in degrees.
    #[serde(default)]
    pub rotation_offset_degrees: i32,
    /// Density assumed for hot-area margins when a screen reports none.
    #[serde(default = "default_density")]
    pub default_density: f32,
}

/// Debounce windows and blocking-call deadlines, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_dirty_flush_ms")]
    pub dirty_flush_ms: u64,
    #[serde(default = "default_virtual_screen_timeout_ms")]
    pub virtual_screen_timeout_ms: u64,
    #[serde(default = "default_focus_request_timeout_ms")]
    pub focus_request_timeout_ms: u64,
}

impl TimingConfig {
    pub fn dirty_flush(&self) -> Duration {
        Duration::from_millis(self.dirty_flush_ms)
    }

    pub fn virtual_screen_timeout(&self) -> Duration {
        Duration::from_millis(self.virtual_screen_timeout_ms)
    }

    pub fn focus_request_timeout(&self) -> Duration {
        Duration::from_millis(self.focus_request_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// File for persisted session state.  In-memory only when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state_path: Option<PathBuf>,
}

/// One screen of the headless backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenEntry {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: u32,
    #[serde(default = "default_screen_density")]
    pub density: f32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_density() -> f32 {
    1.5
}
fn default_dirty_flush_ms() -> u64 {
    10
}
fn default_virtual_screen_timeout_ms() -> u64 {
    1000
}
fn default_focus_request_timeout_ms() -> u64 {
    500
}
fn default_refresh_rate() -> u32 {
    60
}
fn default_screen_density() -> f32 {
    3.0
}
fn default_screens() -> Vec<ScreenEntry> {
    vec![ScreenEntry {
        name: "builtin".to_string(),
        width: 1080,
        height: 2340,
        refresh_rate: default_refresh_rate(),
        density: default_screen_density(),
    }]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            timing: TimingConfig::default(),
            storage: StorageConfig::default(),
            screens: default_screens(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            device_type: None,
            rotation_offset_degrees: 0,
            default_density: default_density(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            dirty_flush_ms: default_dirty_flush_ms(),
            virtual_screen_timeout_ms: default_virtual_screen_timeout_ms(),
            focus_request_timeout_ms: default_focus_request_timeout_ms(),
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

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Loads `AppConfig` from the platform config directory.
///
/// # Errors
///
/// See [`load_config_from`]; additionally [`ConfigError::NoPlatformConfigDir`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
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

/// Persists `config` to the platform config directory.
///
/// # Errors
///
/// See [`save_config_to`]; additionally [`ConfigError::NoPlatformConfigDir`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("WMS"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("wms"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("WMS")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
