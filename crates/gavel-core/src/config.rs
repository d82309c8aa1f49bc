// Configuration loading and parsing (config/client.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::bid::DEFAULT_BID_INCREMENT;

/// Name of the client configuration file inside `config/` and `defaults/`.
pub const CONFIG_FILE: &str = "client.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// client.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub bidding: BiddingConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the snapshot endpoint (`GET {http_url}/items`).
    pub http_url: String,
    /// URL of the push channel.
    pub ws_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BiddingConfig {
    pub increment: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_interval_ms: u64,
    pub flash_duration_ms: u64,
    pub reconnect_delay_ms: u64,
    pub snapshot_retry_ms: u64,
}

impl TimingConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn flash_duration(&self) -> Duration {
        Duration::from_millis(self.flash_duration_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn snapshot_retry(&self) -> Duration {
        Duration::from_millis(self.snapshot_retry_ms)
    }
}

impl Default for BiddingConfig {
    fn default() -> Self {
        BiddingConfig {
            increment: DEFAULT_BID_INCREMENT,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            tick_interval_ms: 1_000,
            flash_duration_ms: 500,
            reconnect_delay_ms: 2_000,
            snapshot_retry_ms: 3_000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            http_url: "http://localhost:3000".into(),
            ws_url: "ws://localhost:3000/ws".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/client.toml` relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&config)?;
    Ok(config)
}

/// Make sure `config/client.toml` exists, seeding it from
/// `defaults/client.toml` when it does not. An existing file is never
/// touched. Returns the path written, if any.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.is_file() {
        return Ok(None);
    }

    let source = base_dir.join("defaults").join(CONFIG_FILE);
    let copy_error = |what: &str, path: &Path, e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("{what} {}: {e}", path.display()),
    };

    let mut reader = std::fs::File::open(&source).map_err(|e| {
        copy_error("no config/client.toml and cannot open", &source, e)
    })?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| copy_error("cannot create", parent, e))?;
    }
    let mut writer = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .map_err(|e| copy_error("cannot create", &target, e))?;
    std::io::copy(&mut reader, &mut writer).map_err(|e| copy_error("cannot write", &target, e))?;

    Ok(Some(target))
}

/// Load config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    if let Some(path) = ensure_config_file(&cwd)? {
        info!("Seeded {} from defaults", path.display());
    }
    load_config_from(&cwd)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    check_scheme("server.http_url", &config.server.http_url, &["http://", "https://"])?;
    check_scheme("server.ws_url", &config.server.ws_url, &["ws://", "wss://"])?;

    if config.bidding.increment == 0 {
        return Err(ConfigError::ValidationError {
            field: "bidding.increment".into(),
            message: "must be greater than 0".into(),
        });
    }

    let t = &config.timing;
    let timing_fields: &[(&str, u64)] = &[
        ("timing.tick_interval_ms", t.tick_interval_ms),
        ("timing.flash_duration_ms", t.flash_duration_ms),
        ("timing.reconnect_delay_ms", t.reconnect_delay_ms),
        ("timing.snapshot_retry_ms", t.snapshot_retry_ms),
    ];
    for (name, val) in timing_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    Ok(())
}

fn check_scheme(field: &str, url: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let has_host = schemes
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .is_some_and(|rest| !rest.is_empty());
    if has_host {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            field: field.into(),
            message: format!("must start with one of {} and name a host, got {url:?}", schemes.join(", ")),
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
