//! Load daemon configuration from a TOML file plus command-line/env overrides.

use relaysig_client::{ClientConfig, ReconnectPolicy};
use relaysig_core::DEFAULT_PATH;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("no relay server configured (set `server`, --server or RELAYSIG_SERVER)")]
    MissingServer,
    #[error("no session token configured (set `session_token`, --token or RELAYSIG_TOKEN)")]
    MissingToken,
}

/// Daemon configuration. File: ~/.config/relaysig/config.toml or
/// /etc/relaysig/config.toml unless `--config` names one.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub signaling_url: Option<String>,
    pub session_token: Option<String>,
    #[serde(default = "default_path")]
    pub path: String,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    /// Default: 5000
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_interval_ms: u64,
    /// Default: 15000
    #[serde(default = "default_ping_ms")]
    pub ping_interval_ms: u64,
    /// Default: 10000
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

/// `[reconnect]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}
fn default_heartbeat_ms() -> u64 {
    5000
}
fn default_ping_ms() -> u64 {
    15000
}
fn default_connect_timeout_ms() -> u64 {
    10000
}
fn default_max_attempts() -> u32 {
    6
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30000
}
fn default_jitter_ms() -> u64 {
    400
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            server: None,
            signaling_url: None,
            session_token: None,
            path: default_path(),
            origin: None,
            user_agent: None,
            heartbeat_interval_ms: default_heartbeat_ms(),
            ping_interval_ms: default_ping_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect: ReconnectSection::default(),
        }
    }
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl From<&ReconnectSection> for ReconnectPolicy {
    fn from(r: &ReconnectSection) -> Self {
        Self {
            max_attempts: r.max_attempts,
            base_delay: Duration::from_millis(r.base_delay_ms),
            max_delay: Duration::from_millis(r.max_delay_ms),
            jitter: Duration::from_millis(r.jitter_ms),
        }
    }
}

/// Values from the command line or environment; these win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub signaling_url: Option<String>,
    pub session_token: Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merge `overrides` and build the client configuration.
    pub fn into_client_config(self, overrides: Overrides) -> Result<ClientConfig, ConfigError> {
        let server = overrides
            .server
            .or(self.server)
            .ok_or(ConfigError::MissingServer)?;
        let token = overrides
            .session_token
            .or(self.session_token)
            .ok_or(ConfigError::MissingToken)?;

        let mut config = ClientConfig::new(server, token)
            .path(self.path)
            .heartbeat_interval(Duration::from_millis(self.heartbeat_interval_ms))
            .ping_interval(Duration::from_millis(self.ping_interval_ms))
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .reconnect(ReconnectPolicy::from(&self.reconnect));
        if let Some(url) = overrides.signaling_url.or(self.signaling_url) {
            config = config.signaling_url(url);
        }
        if let Some(origin) = self.origin {
            config = config.origin(origin);
        }
        if let Some(ua) = self.user_agent {
            config = config.user_agent(ua);
        }
        Ok(config)
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        out.push(home.join(".config/relaysig/config.toml"));
    }
    out.push(PathBuf::from("/etc/relaysig/config.toml"));
    out
}

fn read(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::parse(&text, path)
}

/// Load `explicit` if given, otherwise the first default path that exists,
/// otherwise defaults.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    if let Some(path) = explicit {
        return read(path);
    }
    match config_paths().into_iter().find(|p| p.exists()) {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            read(&path)
        }
        None => Ok(FileConfig::default()),
    }
}
