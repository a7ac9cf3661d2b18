use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("unsupported config format for {path} (expected .toml, .yaml or .yml)")]
    UnsupportedFormat { path: PathBuf },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("zone {0} is not configured")]
    UnknownZone(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
