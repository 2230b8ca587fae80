use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_WS_PATH: &str = "/ws";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub console: Option<ConsoleSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// HTTP base of the detection service (default: http://localhost:8000)
    pub base_url: Option<String>,
    /// Path of the streaming endpoint (default: /ws)
    pub ws_path: Option<String>,
    /// Timeout for the ROI HTTP requests in seconds (default: 10)
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleSection {
    pub mode: Option<ConsoleMode>,
    /// Action pre-selected when live monitoring starts, e.g. "Go Straight"
    pub action: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleMode {
    /// Map new lanes, then go live.
    Roi,
    /// Go live with the lanes already saved on the server.
    Live,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Returns the HTTP base url without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.server
            .as_ref()
            .and_then(|s| s.base_url.as_deref())
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    /// Derives the streaming url from the HTTP base (http → ws, https → wss).
    pub fn ws_url(&self) -> Result<String, ConfigError> {
        let base = self.base_url();
        let host = if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else {
            return Err(ConfigError::InvalidBaseUrl(base.to_string()));
        };

        let path = self
            .server
            .as_ref()
            .and_then(|s| s.ws_path.as_deref())
            .unwrap_or(DEFAULT_WS_PATH);
        if path.starts_with('/') {
            Ok(format!("{host}{path}"))
        } else {
            Ok(format!("{host}/{path}"))
        }
    }

    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .server
            .as_ref()
            .and_then(|s| s.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    /// Returns the start mode (default: roi)
    pub fn mode(&self) -> ConsoleMode {
        self.console
            .as_ref()
            .and_then(|c| c.mode)
            .unwrap_or(ConsoleMode::Roi)
    }

    pub fn initial_action(&self) -> Option<&str> {
        self.console
            .as_ref()
            .and_then(|c| c.action.as_deref())
            .filter(|action| !action.is_empty())
    }

    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }
}
