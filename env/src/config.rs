//! Configuration of application

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::{fs::File, io::AsyncReadExt};
use tracing::info;

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 4000;

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Invalid config file: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub url: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub auto_fallback: bool,
    #[serde(default)]
    pub enable_orders: bool,
}

#[derive(Deserialize, Debug, Default)]
pub struct Config {
    pub connection: Option<ConnectionConfig>,
}

impl Config {
    pub async fn from_path(path: &Path) -> Result<Config, ConfigError> {
        let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
        info!("Load configuration: {:?}", path);
        let mut buf = String::with_capacity(1024);
        let mut f = File::open(&path)
            .await
            .map_err(|e| ConfigError::Io(path.clone(), e))?;
        f.read_to_string(&mut buf)
            .await
            .map_err(|e| ConfigError::Io(path.clone(), e))?;
        Config::parse(&buf)
    }

    pub fn parse(s: &str) -> Result<Config, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
