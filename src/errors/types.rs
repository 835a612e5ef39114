//! Error type definitions for the ETL runner
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that makes debugging and error
//! handling more straightforward.

use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the application.
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Connector layer errors
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Data container errors
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Transfer client errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Delimited file errors
    #[error("Delimited file error: {0}")]
    Csv(#[from] CsvError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Connector (source/target/processor) specific errors
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// No connector registered under the requested variant id
    #[error("Unknown {role} variant: {variant}")]
    UnknownVariant { role: String, variant: String },

    /// The connector cannot reach or use its backing resource
    #[error("{connector} is not available: {reason}")]
    Unavailable { connector: String, reason: String },

    /// Invalid connector configuration
    #[error("Invalid setting: {field} - {message}")]
    InvalidSettings { field: String, message: String },

    /// The settings envelope does not match the connector variant
    #[error("Settings envelope mismatch: expected {expected}, found {found}")]
    EnvelopeMismatch { expected: String, found: String },

    /// A configured SQL query failed the safety screen
    #[error("Unsafe query: {message}")]
    UnsafeQuery { message: String },

    /// The target has no handler for a payload format
    #[error("{connector} does not support loading the {format} format")]
    UnsupportedFormat { connector: String, format: String },

    /// Extraction failed after the connector reported itself available
    #[error("Extraction failed: {connector} - {message}")]
    ExtractFailed { connector: String, message: String },

    /// Load of a single payload failed inside a per-format handler
    #[error("Load failed: {connector} - {message}")]
    LoadFailed { connector: String, message: String },

    /// A payload slot was requested in a format the container does not hold
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Filesystem errors raised while a connector moves data around
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings (de)serialization errors
    #[error("Settings serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transfer client errors surfaced by the generic transfer connectors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Delimited file errors surfaced by the transform processors
    #[error("Delimited file error: {0}")]
    Csv(#[from] CsvError),

    /// Database errors surfaced by the database source
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// HTTP errors surfaced by the URL source
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Data container and load-result errors
#[derive(Error, Debug)]
pub enum DataError {
    /// A payload was requested in a format the container does not hold
    #[error("Data is not available in the {format} format")]
    NotSupported { format: String },

    /// A result was recorded under an empty format name
    #[error("Format name must be a non-empty string")]
    InvalidFormatName,
}

/// Transfer client errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// Connection or authentication failure
    #[error("Connection failed: {host} - {message}")]
    ConnectionFailed { host: String, message: String },

    /// A remote operation failed
    #[error("{operation} failed for {path}: {message}")]
    OperationFailed {
        operation: String,
        path: String,
        message: String,
    },

    /// The underlying transport process could not be spawned
    #[error("Transport unavailable: {0}")]
    Transport(#[from] std::io::Error),
}

/// Delimited (CSV-like) file errors
#[derive(Error, Debug)]
pub enum CsvError {
    /// File missing or unreadable
    #[error("Cannot read delimited file {path}: {message}")]
    Unreadable { path: String, message: String },

    /// File could not be written
    #[error("Cannot write delimited file {path}: {message}")]
    Unwritable { path: String, message: String },

    /// An unterminated quoted field reached the end of input
    #[error("Unterminated quoted field in {path}")]
    UnterminatedQuote { path: String },
}

/// Convenience methods for creating common error types
impl EtlError {
    /// Create a configuration error with a custom message
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl ConnectorError {
    /// Create an unknown variant error
    pub fn unknown_variant<R: Into<String>, V: Into<String>>(role: R, variant: V) -> Self {
        Self::UnknownVariant {
            role: role.into(),
            variant: variant.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable<C: Into<String>, M: Into<String>>(connector: C, reason: M) -> Self {
        Self::Unavailable {
            connector: connector.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid settings error
    pub fn invalid_settings<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidSettings {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an unsafe query error
    pub fn unsafe_query<M: Into<String>>(message: M) -> Self {
        Self::UnsafeQuery {
            message: message.into(),
        }
    }

    /// Create an unsupported format error
    pub fn unsupported_format<C: Into<String>, F: Into<String>>(connector: C, format: F) -> Self {
        Self::UnsupportedFormat {
            connector: connector.into(),
            format: format.into(),
        }
    }

    /// Create an extraction failed error
    pub fn extract_failed<C: Into<String>, M: Into<String>>(connector: C, message: M) -> Self {
        Self::ExtractFailed {
            connector: connector.into(),
            message: message.into(),
        }
    }

    /// Create a load failed error
    pub fn load_failed<C: Into<String>, M: Into<String>>(connector: C, message: M) -> Self {
        Self::LoadFailed {
            connector: connector.into(),
            message: message.into(),
        }
    }
}

impl TransferError {
    /// Create a connection failed error
    pub fn connection_failed<H: Into<String>, M: Into<String>>(host: H, message: M) -> Self {
        Self::ConnectionFailed {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create an operation failed error
    pub fn operation_failed<O: Into<String>, P: Into<String>, M: Into<String>>(
        operation: O,
        path: P,
        message: M,
    ) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}
