//! Configuration for the chatlink client.
//!
//! Layered with the following priority (highest first):
//! 1. CLI arguments / environment variables
//! 2. TOML config file (`~/.config/chatlink/config.toml`)
//! 3. Compiled defaults
//!
//! A missing config file is not an error (defaults are used). An
//! explicit path that does not exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::presence::{PEER_TYPING_SAFETY, TYPING_DEBOUNCE};
use crate::reconnect::ReconnectPlan;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    reconnect: ReconnectFileConfig,
    typing: TypingFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    ws_url: Option<String>,
    api_url: Option<String>,
    csrf_token: Option<String>,
    user_id: Option<i64>,
    event_buffer: Option<usize>,
}

/// `[reconnect]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReconnectFileConfig {
    base_delay_ms: Option<u64>,
    multiplier: Option<f64>,
    max_delay_secs: Option<u64>,
    max_attempts: Option<u32>,
}

/// `[typing]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TypingFileConfig {
    debounce_ms: Option<u64>,
    peer_safety_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket base URL of the message server.
    pub ws_url: Option<String>,
    /// HTTP base URL of the message API (fallback path).
    pub api_url: Option<String>,
    /// CSRF token presented on both the WebSocket upgrade and REST calls.
    pub csrf_token: Option<String>,
    /// Local user id, used to reconcile echoed messages.
    pub user_id: Option<i64>,
    /// Buffer size for the session event channel.
    pub event_buffer: usize,
    /// Reconnection schedule.
    pub reconnect: ReconnectPlan,
    /// Debounce window for outgoing typing signals.
    pub typing_debounce: Duration,
    /// Safety timeout for the peer typing flag.
    pub peer_typing_safety: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            api_url: None,
            csrf_token: None,
            user_id: None,
            event_buffer: 64,
            reconnect: ReconnectPlan::default(),
            typing_debounce: TYPING_DEBOUNCE,
            peer_typing_safety: PEER_TYPING_SAFETY,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file merged over the defaults.
    ///
    /// If `explicit_path` is given the file must exist. Otherwise the
    /// default path (`~/.config/chatlink/config.toml`) is tried and a
    /// missing file falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without CLI parsing or the filesystem.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            ws_url: cli.ws_url.clone().or_else(|| file.server.ws_url.clone()),
            api_url: cli.api_url.clone().or_else(|| file.server.api_url.clone()),
            csrf_token: cli
                .csrf_token
                .clone()
                .or_else(|| file.server.csrf_token.clone()),
            user_id: cli.user_id.or(file.server.user_id),
            event_buffer: file.server.event_buffer.unwrap_or(defaults.event_buffer),
            reconnect: ReconnectPlan {
                base: file
                    .reconnect
                    .base_delay_ms
                    .map_or(defaults.reconnect.base, Duration::from_millis),
                multiplier: file
                    .reconnect
                    .multiplier
                    .unwrap_or(defaults.reconnect.multiplier),
                max_delay: file
                    .reconnect
                    .max_delay_secs
                    .map_or(defaults.reconnect.max_delay, Duration::from_secs),
                max_attempts: file
                    .reconnect
                    .max_attempts
                    .unwrap_or(defaults.reconnect.max_attempts),
            },
            typing_debounce: file
                .typing
                .debounce_ms
                .map_or(defaults.typing_debounce, Duration::from_millis),
            peer_typing_safety: file
                .typing
                .peer_safety_ms
                .map_or(defaults.peer_typing_safety, Duration::from_millis),
        }
    }
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// Command-line arguments. Every networking flag doubles as an environment
/// variable so the client can be scripted without a config file.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time messaging client")]
pub struct CliArgs {
    /// WebSocket base URL of the message server.
    #[arg(long, env = "CHATLINK_WS_URL")]
    pub ws_url: Option<String>,

    /// HTTP base URL of the message API.
    #[arg(long, env = "CHATLINK_API_URL")]
    pub api_url: Option<String>,

    /// CSRF token presented to the server.
    #[arg(long, env = "CHATLINK_CSRF_TOKEN")]
    pub csrf_token: Option<String>,

    /// Local user id.
    #[arg(long, env = "CHATLINK_USER_ID")]
    pub user_id: Option<i64>,

    /// Conversation to bind to.
    #[arg(long)]
    pub conversation: Option<i64>,

    /// Path to config file (default: `~/.config/chatlink/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CHATLINK_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and a missing
/// file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available, use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("chatlink").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
