//! Configuration system for `peerchat`.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/peerchat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

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
    conversation: ConversationFileConfig,
    demo: DemoFileConfig,
    ui: UiFileConfig,
}

/// `[conversation]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConversationFileConfig {
    reorder_window: Option<usize>,
    trim_incoming: Option<bool>,
}

/// `[demo]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DemoFileConfig {
    local_name: Option<String>,
    peer_name: Option<String>,
    ack_delay_ms: Option<u64>,
    echo: Option<bool>,
    channel_capacity: Option<usize>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Behavior knobs of a single [`Conversation`](crate::conversation::Conversation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationConfig {
    /// How many of the newest rows an incoming message may be anchored into.
    pub reorder_window: usize,
    /// Whether incoming text is trimmed of surrounding whitespace.
    pub trim_incoming: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            reorder_window: 5,
            trim_incoming: true,
        }
    }
}

/// Fully resolved configuration of the demo client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Conversation --
    /// Conversation store settings.
    pub conversation: ConversationConfig,

    // -- Demo --
    /// Name shown for our own messages.
    pub local_name: String,
    /// Identity of the simulated peer.
    pub peer_name: String,
    /// Simulated latency before the peer acknowledges a message.
    pub ack_delay: Duration,
    /// Whether the simulated peer answers every message.
    pub echo: bool,
    /// Capacity of the dispatcher command channel.
    pub channel_capacity: usize,

    // -- UI --
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            conversation: ConversationConfig::default(),
            local_name: "me".to_string(),
            peer_name: "echo".to_string(),
            ack_delay: Duration::from_millis(300),
            echo: true,
            channel_capacity: 64,
            timestamp_format: "%H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path (`~/.config/peerchat/config.toml`)
    /// is tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            conversation: ConversationConfig {
                reorder_window: file
                    .conversation
                    .reorder_window
                    .unwrap_or(defaults.conversation.reorder_window),
                trim_incoming: file
                    .conversation
                    .trim_incoming
                    .unwrap_or(defaults.conversation.trim_incoming),
            },
            local_name: file
                .demo
                .local_name
                .clone()
                .unwrap_or(defaults.local_name),
            peer_name: cli
                .peer_name
                .clone()
                .or_else(|| file.demo.peer_name.clone())
                .unwrap_or(defaults.peer_name),
            ack_delay: file
                .demo
                .ack_delay_ms
                .map_or(defaults.ack_delay, Duration::from_millis),
            echo: file.demo.echo.unwrap_or(defaults.echo),
            channel_capacity: file
                .demo
                .channel_capacity
                .unwrap_or(defaults.channel_capacity),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.ui.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Conversation store demo with a simulated peer")]
pub struct CliArgs {
    /// Name of the simulated peer.
    #[arg(long, env = "PEERCHAT_PEER")]
    pub peer_name: Option<String>,

    /// Path to config file (default: `~/.config/peerchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PEERCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: stderr).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// `~/.config/peerchat/config.toml`, or `None` without a config dir.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("peerchat").join("config.toml"))
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(path) = explicit_path {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(path) = default_config_path() else {
        return Ok(ConfigFile::default());
    };
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
