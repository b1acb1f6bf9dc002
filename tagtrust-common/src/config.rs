//! Bootstrap configuration loading
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority, applied by the binary)
//! 2. Environment variable (`TAGTRUST_*`)
//! 3. TOML config file
//! 4. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "TAGTRUST_CONFIG";

/// Environment variable overriding the database path
pub const DATABASE_PATH_ENV: &str = "TAGTRUST_DATABASE";

/// Environment variable overriding the HTTP port
pub const PORT_ENV: &str = "TAGTRUST_PORT";

/// Bootstrap configuration. Cannot change while the service runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Interface to bind the HTTP server to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub moderation: ModerationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Total time a decision may spend retrying on lock contention
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,

    /// Seconds between reconciliation passes (0 disables the job)
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Rewrite drifted projections instead of only reporting them
    #[serde(default)]
    pub reconcile_repair: bool,

    /// Moderation queue page size
    #[serde(default = "default_page_size")]
    pub page_size: i64,

    /// Broadcast channel capacity for live moderation events
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            max_lock_wait_ms: default_max_lock_wait_ms(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            reconcile_repair: false,
            page_size: default_page_size(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            port: default_port(),
            logging: LoggingConfig::default(),
            moderation: ModerationConfig::default(),
        }
    }
}

fn default_database_path() -> PathBuf {
    default_data_folder().join("tagtrust.db")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5740
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_lock_wait_ms() -> u64 {
    2000
}

fn default_reconcile_interval_secs() -> u64 {
    3600
}

fn default_page_size() -> i64 {
    50
}

fn default_event_bus_capacity() -> usize {
    256
}

impl TomlConfig {
    /// Parse a TOML document, rejecting values the engine cannot run with
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.moderation.page_size < 1 || self.moderation.page_size > 500 {
            return Err(Error::Config(format!(
                "moderation.page_size must be within 1..=500, got {}",
                self.moderation.page_size
            )));
        }
        if self.moderation.event_bus_capacity == 0 {
            return Err(Error::Config(
                "moderation.event_bus_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `TAGTRUST_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var(DATABASE_PATH_ENV) {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var(PORT_ENV) {
            self.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid {}: {}", PORT_ENV, e)))?;
        }
        Ok(())
    }
}

/// Load configuration: explicit file (CLI or `TAGTRUST_CONFIG`), else the
/// platform config file, else defaults; then environment overrides.
pub fn load_config(explicit_path: Option<&Path>) -> Result<TomlConfig> {
    let env_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
    let chosen = explicit_path.map(Path::to_path_buf).or(env_path);

    let mut config = match chosen {
        // An explicitly named file must exist and parse
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            TomlConfig::from_file(&path)?
        }
        None => match locate_config_file() {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                TomlConfig::from_file(&path)?
            }
            None => {
                info!("No config file found, using built-in defaults");
                TomlConfig::default()
            }
        },
    };

    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// Platform config file: `~/.config/tagtrust/config.toml`, then
/// `/etc/tagtrust/config.toml` on Linux
fn locate_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("tagtrust").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/tagtrust/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    None
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    match dirs::data_local_dir() {
        Some(dir) => dir.join("tagtrust"),
        None => {
            warn!("Could not determine local data directory, using ./tagtrust_data");
            PathBuf::from("./tagtrust_data")
        }
    }
}
