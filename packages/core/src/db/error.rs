//! Database Error Types
//!
//! This module defines error types for store operations, providing
//! clear error handling for connection, initialization, and query failures.

use std::path::PathBuf;
use thiserror::Error;

/// Store operation errors
///
/// Covers connection, schema initialization, statement execution and
/// transaction misuse for every [`TreeStore`](super::TreeStore) driver.
/// Tree-level rule violations are reported by the operations layer instead.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[cfg(feature = "turso")]
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Invalid database path provided
    #[error("Invalid database path: {path}")]
    InvalidPath { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[cfg(feature = "turso")]
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Stored value could not be decoded into the expected shape
    #[error("Unexpected value in column '{column}': {detail}")]
    UnexpectedValue { column: String, detail: String },

    /// Transaction started twice, or committed without being started
    #[error("Transaction error: {0}")]
    TransactionError(String),
}

impl DatabaseError {
    /// Create a connection failed error
    #[cfg(feature = "turso")]
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: PathBuf) -> Self {
        Self::InvalidPath { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create an unexpected value error
    pub fn unexpected_value(column: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnexpectedValue {
            column: column.into(),
            detail: detail.into(),
        }
    }

    /// Create a transaction error
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::TransactionError(msg.into())
    }
}
