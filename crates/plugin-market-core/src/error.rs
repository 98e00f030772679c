use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Package not found in registry: {name}")]
    PackageNotFound { name: String },

    #[error("Package is not installed: {name}")]
    NotInstalled { name: String },

    #[error("Package '{name}' failed validation with {errors} error(s)")]
    InvalidPackage { name: String, errors: usize },

    #[error("Target directory does not exist: {path}")]
    TargetNotFound { path: PathBuf },

    #[error("Target directory is not writable: {path} ({message})")]
    TargetNotWritable { path: PathBuf, message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to parse {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("Invalid value for {key}: {message}")]
    ConfigValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Home directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, MarketError>;

impl MarketError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PackageNotFound { .. } => 2,
            Self::TargetNotFound { .. } | Self::TargetNotWritable { .. } => 3,
            Self::InvalidPackage { .. } => 4,
            Self::NotInstalled { .. } => 5,
            _ => 1,
        }
    }
}
