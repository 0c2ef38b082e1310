//! Error types for leadwatch.

use std::path::PathBuf;

/// Top-level error type for the monitor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration file {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a chat-source connector.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The connector cannot be reached at all. Fatal at startup.
    #[error("Connector {name} is unreachable: {reason}")]
    Unreachable { name: String, reason: String },

    /// The list of active chat sources could not be read.
    #[error("Failed to enumerate chat sources: {0}")]
    Enumeration(String),

    /// Selecting or reading one chat source failed.
    #[error("Failed to fetch messages from {source_name}: {reason}")]
    Fetch { source_name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Tabular store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Cannot create table at {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot append to table at {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The table ends inside a quoted field, e.g. after an interrupted write.
    #[error("Table at {path} ends inside a quoted field")]
    UnterminatedField { path: PathBuf },

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Source enumeration failed: {0}")]
    Enumeration(#[source] ConnectorError),

    #[error("Flush failed: {0}")]
    Flush(#[from] StorageError),
}

/// Result type alias for the monitor.
pub type Result<T> = std::result::Result<T, Error>;
