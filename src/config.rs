use crate::muted_error;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a connection to the debugger engine is established.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectMode {
    /// Wait for the engine to connect (a debugged script calls back to the IDE).
    #[default]
    Listen,
    /// Connect to an engine that is already listening.
    Connect,
}

/// Where and how to reach a debugger engine.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ConnectionConfig {
    /// Interface to listen on, or host to connect to. Empty means all interfaces.
    pub host: String,
    pub port: u16,
    /// Maximum wait for an inbound connection (or an outbound connect).
    pub timeout: Duration,
    pub mode: ConnectMode,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            mode: ConnectMode::Listen,
        }
    }
}

impl ConnectionConfig {
    pub fn listen(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn connect(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            mode: ConnectMode::Connect,
            ..Default::default()
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Socket address as `host:port`, an empty host is replaced with the wildcard address.
    pub fn address(&self) -> String {
        let host = match (self.host.as_str(), self.mode) {
            ("", ConnectMode::Listen) => "0.0.0.0",
            ("", ConnectMode::Connect) => "127.0.0.1",
            (host, _) => host,
        };
        format!("{host}:{}", self.port)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConnectionSection {
    host: Option<String>,
    port: Option<u16>,
    /// Seconds.
    timeout: Option<u64>,
    mode: Option<ConnectMode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    connection: ConnectionSection,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Client configuration, loaded from a TOML file.
///
/// ```toml
/// [connection]
/// host = "127.0.0.1"
/// port = 9003
/// timeout = 60
/// mode = "listen"
/// ```
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Config {
    pub connection: ConnectionConfig,
}

impl Config {
    const DEFAULT_PATH: &'static str = ".config/dbgp/config.toml";

    pub fn from_toml(data: &str) -> Result<Self, toml::de::Error> {
        let file: FileConfig = toml::de::from_str(data)?;
        let section = file.connection;
        let defaults = ConnectionConfig::default();
        Ok(Config {
            connection: ConnectionConfig {
                host: section.host.unwrap_or(defaults.host),
                port: section.port.unwrap_or(defaults.port),
                timeout: section
                    .timeout
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.timeout),
                mode: section.mode.unwrap_or(defaults.mode),
            },
        })
    }

    /// Load config from a file.
    ///
    /// Without an explicit path `~/.config/dbgp/config.toml` is used if it exists,
    /// defaults otherwise. An explicit path must exist and be valid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, data) = match path {
            None => {
                let Some(data) = home::home_dir()
                    .and_then(|home| muted_error!(read_to_string(home.join(Self::DEFAULT_PATH))))
                else {
                    return Ok(Config::default());
                };
                (Self::DEFAULT_PATH.to_string(), data)
            }
            Some(path) => {
                let data = read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                (path.display().to_string(), data)
            }
        };

        Self::from_toml(&data).map_err(|source| ConfigError::Parse { path, source })
    }
}
