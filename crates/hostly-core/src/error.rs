use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostlyError {
    #[error("Profile not found: {id}")]
    NotFound { id: String },

    #[error("Permission denied writing {path} - re-run with elevated privileges")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to fetch {url}: {cause}")]
    Network { url: String, cause: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Update already in progress for profile {id}")]
    AlreadyInProgress { id: String },

    #[error("Config parse error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Data directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, HostlyError>;

impl HostlyError {
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }

    pub fn not_found(id: &str) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Stable name used when the error crosses the RPC boundary
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::PermissionDenied { .. } => "PermissionDenied",
            Self::Network { .. } => "NetworkError",
            Self::Timeout { .. } => "Timeout",
            Self::InvalidFormat { .. } => "InvalidFormat",
            Self::AlreadyInProgress { .. } => "AlreadyInProgress",
            Self::ConfigParse { .. } | Self::ConfigKeyNotFound { .. } => "ConfigError",
            _ => "Internal",
        }
    }
}
