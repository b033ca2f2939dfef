//! RON configuration for the vidtap binary.
//!
//! A missing file yields the defaults; anything else that goes wrong while
//! reading it stops startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vidtap_core::Targets;
use vidtap_engine::DownloadSettings;
use vidtap_logging::tap_info;

pub const DEFAULT_CONFIG_PATH: &str = "vidtap.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub targets: Targets,
    pub download: DownloadConfig,
    pub bridge: BridgeConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub output_dir: PathBuf,
    pub asset_base: String,
    pub upscale_endpoint: String,
    pub request_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        let defaults = DownloadSettings::default();
        Self {
            output_dir: defaults.output_dir,
            asset_base: defaults.asset_base,
            upscale_endpoint: defaults.upscale_endpoint,
            request_timeout_secs: defaults.request_timeout.as_secs(),
        }
    }
}

impl DownloadConfig {
    pub fn settings(&self) -> DownloadSettings {
        DownloadSettings {
            output_dir: self.output_dir.clone(),
            asset_base: self.asset_base.clone(),
            upscale_endpoint: self.upscale_endpoint.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            now: Arc::clone(&DownloadSettings::default().now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a host call may wait for its reply.
    pub call_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 10,
        }
    }
}

impl BridgeConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogDestination {
    Stderr,
    File,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub destination: LogDestination,
    pub level: LogLevel,
    pub file: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            destination: LogDestination::Stderr,
            level: LogLevel::Info,
            file: PathBuf::from("vidtap.log"),
        }
    }
}

/// Reads `path`, falling back to defaults when the file does not exist.
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tap_info!("no config at {:?}, using defaults", path);
            return Ok(AppConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    ron::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
