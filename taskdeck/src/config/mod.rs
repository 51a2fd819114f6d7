//! Configuration system for the `TaskDeck` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskdeck/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

/// Hub URL used when neither the CLI nor the config file names one.
pub const DEFAULT_HUB_URL: &str = "ws://127.0.0.1:9400/ws";

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
    hub: HubFileConfig,
    session: SessionFileConfig,
    ui: UiFileConfig,
}

/// `[hub]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct HubFileConfig {
    url: Option<String>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    account_id: Option<String>,
    meeting_id: Option<String>,
    display_name: Option<String>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    poll_timeout_ms: Option<u64>,
    quiet: Option<bool>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Sync hub WebSocket URL; `None` means an offline session.
    pub hub_url: Option<String>,
    /// Account key scoping the shared task list.
    pub account_id: Option<String>,
    /// Meeting key for breakout grouping.
    pub meeting_id: Option<String>,
    /// Pre-fill for the display-name prompt. Never bypasses validation.
    pub display_name: Option<String>,
    /// Silence the timer chime.
    pub quiet: bool,
    /// Poll timeout for the TUI event loop.
    pub poll_timeout: Duration,
    /// Log level filter (tracing `EnvFilter` syntax).
    pub log_filter: String,
    /// Log file path override.
    pub log_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hub_url: Some(DEFAULT_HUB_URL.to_string()),
            account_id: None,
            meeting_id: None,
            display_name: None,
            quiet: false,
            poll_timeout: Duration::from_millis(50),
            log_filter: "info".to_string(),
            log_file: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path
    /// (`~/.config/taskdeck/config.toml`) is tried and silently ignored if
    /// missing.
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
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            hub_url: if cli.offline {
                None
            } else {
                cli.hub
                    .clone()
                    .or_else(|| file.hub.url.clone())
                    .or(defaults.hub_url)
            },
            account_id: cli
                .account_id
                .clone()
                .or_else(|| file.session.account_id.clone()),
            meeting_id: cli
                .meeting_id
                .clone()
                .or_else(|| file.session.meeting_id.clone()),
            display_name: cli
                .display_name
                .clone()
                .or_else(|| file.session.display_name.clone()),
            quiet: cli.quiet || file.ui.quiet.unwrap_or(false),
            poll_timeout: file
                .ui
                .poll_timeout_ms
                .map_or(defaults.poll_timeout, Duration::from_millis),
            log_filter: if cli.log.is_empty() {
                defaults.log_filter
            } else {
                cli.log.clone()
            },
            log_file: cli.log_file.clone(),
        }
    }
}

/// CLI arguments parsed by clap.
///
/// The host app passed account and meeting keys through the embed URL; the
/// `env` attributes fill the same role for scripted launches.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Shared task deck for your meeting room")]
pub struct CliArgs {
    /// WebSocket URL of the sync hub.
    #[arg(long, env = "TASKDECK_HUB")]
    pub hub: Option<String>,

    /// Account key the shared task list belongs to.
    #[arg(long, env = "TASKDECK_ACCOUNT")]
    pub account_id: Option<String>,

    /// Meeting key scoping breakout groups.
    #[arg(long, env = "TASKDECK_MEETING")]
    pub meeting_id: Option<String>,

    /// Pre-fill for the display-name prompt.
    #[arg(long)]
    pub display_name: Option<String>,

    /// Run without a hub against an in-process store.
    #[arg(long)]
    pub offline: bool,

    /// Silence the timer chime.
    #[arg(long)]
    pub quiet: bool,

    /// Path to config file (default: `~/.config/taskdeck/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKDECK_LOG")]
    pub log: String,

    /// Path to log file (default: `<data dir>/taskdeck/taskdeck.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskdeck").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
