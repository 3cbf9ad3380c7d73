//! Error types for sql_sync

use std::path::PathBuf;

use thiserror::Error;

/// Result type for sql_sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sql_sync
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// First path segment is not one of the supported object types.
    #[error("Unsupported object type '{object_type}' in path '{path}'")]
    UnsupportedObject { path: String, object_type: String },

    /// Source paths must be relative to the base path.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Migration entry not found: {0}")]
    MigrationNotFound(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Script error: {0}")]
    ScriptError(String),

    #[error("Failed to read file {}: {source}", path.display())]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Create an InvalidPath error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedObject error
    pub fn unsupported_object(path: impl Into<String>, object_type: impl Into<String>) -> Self {
        Error::UnsupportedObject {
            path: path.into(),
            object_type: object_type.into(),
        }
    }
}

/// Convert Serde JSON errors to sql_sync errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert YAML deserialization errors to sql_sync errors
impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}

/// Convert TOML deserialization errors to sql_sync errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
