//! Configuration management for the sshgate gateway.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/sshgate/config.toml`.
//! Values are layered: defaults, then the file, then `SSHGATE_*` environment
//! variables, then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::HostKeyPolicy;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be between 1 and 65535, got {0}")]
    InvalidPort(u16),

    #[error("timeout_secs must be between 1 and 300, got {0}")]
    InvalidTimeout(u64),

    #[error("max_sessions must be between 1 and 10000, got {0}")]
    InvalidMaxSessions(usize),

    #[error("buffer_size must be between 1024 and 1048576, got {0}")]
    InvalidBufferSize(usize),

    #[error("rate_limit must be greater than 0")]
    InvalidRateLimit,

    #[error("{0} must be greater than 0")]
    ZeroInterval(&'static str),

    #[error("allowed_origins must not be empty")]
    NoAllowedOrigins,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the sshgate gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub daemon: DaemonConfig,

    /// HTTP listener configuration.
    pub server: ServerConfig,

    /// Outbound SSH configuration.
    pub ssh: SshConfig,

    /// Admission and expiry limits.
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Shorthand for `log_level = "debug"`.
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub address: String,

    /// Listen port.
    pub port: u16,

    /// Origins allowed by CORS. `*` allows any.
    pub allowed_origins: Vec<String>,

    /// Use `X-Forwarded-For` / `X-Real-IP` as the rate-limit key.
    /// Only enable behind a reverse proxy that sets them.
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SshConfig {
    /// Connect and authentication timeout in seconds.
    pub timeout_secs: u64,

    /// Ceiling on pending sessions.
    pub max_sessions: usize,

    /// Largest chunk relayed per output frame, in bytes.
    pub buffer_size: usize,

    /// Accepted server key fingerprints (`SHA256:...`). Empty accepts any.
    pub host_key_fingerprints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Create-session calls admitted per source per window.
    pub rate_limit: u32,

    pub rate_window_secs: u64,

    /// Age at which an unclaimed session is expired.
    pub session_grace_secs: u64,

    pub reap_interval_secs: u64,

    pub sweep_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8888,
            allowed_origins: vec!["*".to_string()],
            trust_proxy_headers: false,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_sessions: crate::admission::DEFAULT_MAX_SESSIONS,
            buffer_size: crate::session::DEFAULT_BUFFER_SIZE,
            host_key_fingerprints: Vec::new(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit: crate::admission::DEFAULT_RATE_LIMIT,
            rate_window_secs: 60,
            session_grace_secs: 30,
            reap_interval_secs: 30,
            sweep_interval_secs: 60,
        }
    }
}

/// Runtime settings derived from a validated [`Config`].
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub connect_timeout: Duration,
    pub max_sessions: usize,
    pub buffer_size: usize,
    pub allowed_origins: Vec<String>,
    pub trust_proxy_headers: bool,
    pub host_key_policy: HostKeyPolicy,
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub session_grace: Duration,
    pub reap_interval: Duration,
    pub sweep_interval: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Config::default().settings()
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sshgate")
        .join("config.toml")
}

/// One environment variable that was looked at by
/// [`Config::apply_env_overrides`].
///
/// Overrides are applied before logging is set up, so they are reported back
/// to the caller instead of being logged on the spot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvOverride {
    /// The variable replaced a configured value.
    Applied { variable: &'static str, value: String },
    /// The variable was set but could not be parsed.
    Ignored { variable: &'static str, value: String },
}

impl EnvOverride {
    /// Emits this override at the matching level.
    pub fn log(&self) {
        match self {
            EnvOverride::Applied { variable, value } => {
                tracing::info!(variable, value = %value, "Applied environment override");
            }
            EnvOverride::Ignored { variable, value } => {
                tracing::warn!(variable, value = %value, "Ignoring unparseable environment override");
            }
        }
    }
}

/// Collects the overrides read from the environment.
#[derive(Default)]
struct EnvReader {
    seen: Vec<EnvOverride>,
}

impl EnvReader {
    /// Reads a non-empty environment variable.
    fn value(&mut self, variable: &'static str) -> Option<String> {
        let value = std::env::var(variable).ok().filter(|v| !v.is_empty())?;
        self.seen.push(EnvOverride::Applied {
            variable,
            value: value.clone(),
        });
        Some(value)
    }

    /// Reads and parses a non-empty environment variable.
    fn parsed<T: std::str::FromStr>(&mut self, variable: &'static str) -> Option<T> {
        let raw = std::env::var(variable).ok().filter(|v| !v.is_empty())?;
        match raw.parse() {
            Ok(value) => {
                self.seen.push(EnvOverride::Applied {
                    variable,
                    value: raw,
                });
                Some(value)
            }
            Err(_) => {
                self.seen.push(EnvOverride::Ignored {
                    variable,
                    value: raw,
                });
                None
            }
        }
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Empty values are ignored. Supported variables:
    /// - SSHGATE_ADDRESS: listen address
    /// - SSHGATE_PORT: listen port
    /// - SSHGATE_TIMEOUT: connect timeout in seconds
    /// - SSHGATE_MAXCONN: pending-session ceiling
    /// - SSHGATE_BUFFER: output chunk size in bytes
    /// - SSHGATE_ORIGINS: comma-separated CORS origins
    /// - SSHGATE_DEBUG: `true`/`1` enables debug logging
    /// - SSHGATE_LOG_LEVEL: log level (trace, debug, info, warn, error)
    ///
    /// Returns every variable that was set, applied or not, for the caller
    /// to log once tracing is initialized.
    #[must_use]
    pub fn apply_env_overrides(&mut self) -> Vec<EnvOverride> {
        let mut env = EnvReader::default();

        if let Some(address) = env.value("SSHGATE_ADDRESS") {
            self.server.address = address;
        }
        if let Some(port) = env.parsed("SSHGATE_PORT") {
            self.server.port = port;
        }
        if let Some(timeout) = env.parsed("SSHGATE_TIMEOUT") {
            self.ssh.timeout_secs = timeout;
        }
        if let Some(max) = env.parsed("SSHGATE_MAXCONN") {
            self.ssh.max_sessions = max;
        }
        if let Some(buffer) = env.parsed("SSHGATE_BUFFER") {
            self.ssh.buffer_size = buffer;
        }
        if let Some(origins) = env.value("SSHGATE_ORIGINS") {
            self.server.allowed_origins = parse_origins(&origins);
        }
        if let Some(debug) = env.value("SSHGATE_DEBUG") {
            self.daemon.debug = matches!(debug.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(level) = env.value("SSHGATE_LOG_LEVEL") {
            self.daemon.log_level = level;
        }

        env.seen
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }
        if !(1..=300).contains(&self.ssh.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.ssh.timeout_secs));
        }
        if !(1..=10_000).contains(&self.ssh.max_sessions) {
            return Err(ConfigError::InvalidMaxSessions(self.ssh.max_sessions));
        }
        if !(1024..=1024 * 1024).contains(&self.ssh.buffer_size) {
            return Err(ConfigError::InvalidBufferSize(self.ssh.buffer_size));
        }
        if self.limits.rate_limit == 0 {
            return Err(ConfigError::InvalidRateLimit);
        }
        for (name, value) in [
            ("rate_window_secs", self.limits.rate_window_secs),
            ("session_grace_secs", self.limits.session_grace_secs),
            ("reap_interval_secs", self.limits.reap_interval_secs),
            ("sweep_interval_secs", self.limits.sweep_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        if self.server.allowed_origins.is_empty() {
            return Err(ConfigError::NoAllowedOrigins);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// The effective log level, accounting for the `debug` switch.
    pub fn effective_log_level(&self) -> String {
        if self.daemon.debug {
            "debug".to_string()
        } else {
            self.daemon.log_level.to_lowercase()
        }
    }

    /// Listen address as `host:port`, bracketing IPv6 literals.
    pub fn listen_addr(&self) -> String {
        let address = &self.server.address;
        if address.contains(':') && !address.starts_with('[') {
            format!("[{}]:{}", address, self.server.port)
        } else {
            format!("{}:{}", address, self.server.port)
        }
    }

    /// Runtime settings for the gateway.
    pub fn settings(&self) -> GatewaySettings {
        GatewaySettings {
            connect_timeout: Duration::from_secs(self.ssh.timeout_secs),
            max_sessions: self.ssh.max_sessions,
            buffer_size: self.ssh.buffer_size,
            allowed_origins: self.server.allowed_origins.clone(),
            trust_proxy_headers: self.server.trust_proxy_headers,
            host_key_policy: HostKeyPolicy::from_fingerprints(&self.ssh.host_key_fingerprints),
            rate_limit: self.limits.rate_limit,
            rate_window: Duration::from_secs(self.limits.rate_window_secs),
            session_grace: Duration::from_secs(self.limits.session_grace_secs),
            reap_interval: Duration::from_secs(self.limits.reap_interval_secs),
            sweep_interval: Duration::from_secs(self.limits.sweep_interval_secs),
        }
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Splits a comma-separated origin list.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
