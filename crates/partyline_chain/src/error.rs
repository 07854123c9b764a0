//! # Error Types
//!
//! Ledger and configuration failures. None of them is fatal to the host: ledger
//! errors end up in the stream status, configuration errors are returned to
//! whoever loads the settings.

use std::path::PathBuf;

use thiserror::Error;

/// A ledger query failed.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The request never got a response.
    #[error("ledger unreachable: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("ledger returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The node rejected the call.
    #[error("ledger RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The response body was not what a query returns.
    #[error("undecodable ledger response: {0}")]
    Decode(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Settings could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The settings are not valid TOML for this schema.
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
