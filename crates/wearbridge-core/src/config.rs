/*!
 * Configuration management for Wearbridge.
 *
 * Configuration is layered: built-in defaults, then an optional file, then
 * environment variables. The scanning and cache sections hold the defaults
 * used when a device has no preference of its own.
 */
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::Value;

/// Core configuration for Wearbridge
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Runtime configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Passive scanning defaults
    #[serde(default)]
    pub scanning: ScanningConfig,

    /// Offline notification cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Platform radio adapter
    #[serde(default)]
    pub radio: RadioConfig,

    /// Devices registered at start
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Global preference values
    #[serde(default)]
    pub preferences: HashMap<String, Value>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Send a broadcast connect request once the service is up
    #[serde(default = "default_true")]
    pub connect_on_start: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (e.g. "info", "wearbridge_engine=debug")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to include the event target in log lines
    #[serde(default = "default_true")]
    pub show_target: bool,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 means use number of available CPU cores)
    #[serde(default)]
    pub worker_threads: usize,

    /// Capacity of the service mailbox
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Upper bound on a single driver disposal, in milliseconds
    #[serde(default = "default_dispose_timeout_ms")]
    pub dispose_timeout_ms: u64,

    /// Enable debugging features such as the connect stress mode
    #[serde(default)]
    pub debug_mode: bool,
}

/// Passive scanning defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanningConfig {
    /// Seconds a sighted device stays SCANNED before reverting
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,

    /// Minimum seconds between two sightings that are acted on
    #[serde(default)]
    pub unseen_seconds: u64,

    /// Sightings weaker than this RSSI are ignored
    #[serde(default = "default_rssi_threshold")]
    pub rssi_threshold: i32,

    /// Put disconnected radio devices into WAITING_FOR_SCAN at start
    #[serde(default)]
    pub reconnect_via_scan: bool,
}

/// Offline notification cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of notifications kept per device
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Cache notifications for devices that are not initialized
    #[serde(default)]
    pub cache_while_disconnected: bool,
}

/// Platform radio adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// An adapter is present on this host
    #[serde(default = "default_true")]
    pub available: bool,

    /// The adapter is switched on
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A device to register when the service starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device address
    pub address: String,

    /// Device family name
    pub family: String,

    /// User-visible alias
    #[serde(default)]
    pub alias: Option<String>,

    /// Per-device preference values
    #[serde(default)]
    pub preferences: HashMap<String, Value>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            connect_on_start: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            show_target: true,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            mailbox_capacity: default_mailbox_capacity(),
            dispose_timeout_ms: default_dispose_timeout_ms(),
            debug_mode: false,
        }
    }
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: default_debounce_seconds(),
            unseen_seconds: 0,
            rssi_threshold: default_rssi_threshold(),
            reconnect_via_scan: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            cache_while_disconnected: false,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            available: true,
            enabled: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_dispose_timeout_ms() -> u64 {
    5_000
}

fn default_debounce_seconds() -> u64 {
    60
}

fn default_rssi_threshold() -> i32 {
    -100
}

fn default_cache_capacity() -> usize {
    10
}

impl Config {
    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        let default_config = Config::default();
        let mut builder = ConfigLib::builder().add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            if Path::new(&config_file).exists() {
                debug!("Loading configuration from {}", config_file);
                builder = builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            builder = builder.add_source(
                Environment::with_prefix(&prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: Config = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        validate(&config)?;
        info!("Configuration loaded successfully");
        Ok(config)
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.cache.capacity == 0 {
        return Err(Error::config("cache.capacity must be at least 1"));
    }
    if config.runtime.mailbox_capacity == 0 {
        return Err(Error::config("runtime.mailbox_capacity must be at least 1"));
    }
    if let Some(device) = config.devices.iter().find(|d| d.address.trim().is_empty()) {
        return Err(Error::config(format!(
            "device entry with family {} has an empty address",
            device.family
        )));
    }
    Ok(())
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}
