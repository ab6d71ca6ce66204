//! Bootstrap configuration for the jukebox player daemon
//!
//! Settings come from, highest priority first:
//! 1. Command-line arguments (--port, --database, --debug)
//! 2. TOML configuration file (--config or JUKEBOX_CONFIG)
//! 3. Built-in defaults
//!
//! Nothing here can change while the daemon runs.

use crate::error::{Error, Result};
use crate::playback::ControllerConfig;
use crate::remote::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file (relative or absolute)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port for live updates
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enables the `reset` event
    #[serde(default)]
    pub debug: bool,

    /// Mark users synchronized as soon as their live-update connection opens
    #[serde(default = "default_true")]
    pub auto_sync_on_connect: bool,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub gc: GcConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error); RUST_LOG wins
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Remote player provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the Web-API compatible provider
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Prefix turning a song ID into a playable URI
    #[serde(default = "default_track_uri_prefix")]
    pub track_uri_prefix: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Playback controller tuning
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// Fixed delay before retrying an advance whose queue read failed
    #[serde(default = "default_advance_retry_ms")]
    pub advance_retry_ms: u64,
}

/// Session garbage collection
#[derive(Debug, Clone, Deserialize)]
pub struct GcConfig {
    #[serde(default = "default_gc_interval_s")]
    pub interval_s: u64,

    /// Sessions idle for longer than this are deleted
    #[serde(default = "default_session_expiration_s")]
    pub session_expiration_s: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("jukebox.db")
}

fn default_port() -> u16 {
    5830
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_track_uri_prefix() -> String {
    "spotify:track:".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_advance_retry_ms() -> u64 {
    500
}

fn default_gc_interval_s() -> u64 {
    3600
}

fn default_session_expiration_s() -> u64 {
    86_400
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            track_uri_prefix: default_track_uri_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { advance_retry_ms: default_advance_retry_ms() }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_s: default_gc_interval_s(),
            session_expiration_s: default_session_expiration_s(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            debug: false,
            auto_sync_on_connect: true,
            logging: LoggingConfig::default(),
            remote: RemoteConfig::default(),
            retry: RetryPolicy::default(),
            playback: PlaybackConfig::default(),
            gc: GcConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.gc.interval_s == 0 {
            return Err(Error::Config("gc.interval_s must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Load from file; a missing path means built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No config file given, using built-in defaults");
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, port: Option<u16>, database: Option<PathBuf>, debug: bool) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(database) = database {
            self.database_path = database;
        }
        if debug {
            self.debug = true;
        }
        self
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            debug: self.debug,
            auto_sync_on_connect: self.auto_sync_on_connect,
            advance_retry_delay: Duration::from_millis(self.playback.advance_retry_ms),
            track_uri_prefix: self.remote.track_uri_prefix.clone(),
        }
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc.interval_s)
    }

    pub fn session_expiration(&self) -> Duration {
        Duration::from_secs(self.gc.session_expiration_s)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.request_timeout_ms)
    }
}
