//! Custom error types for the common library
//!
//! This module defines the infrastructure error types returned by the
//! database and storage modules.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Custom error type for media bucket operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// No object with this name exists in the bucket
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The object name cannot address an object in a bucket
    #[error("Invalid object name: {0}")]
    InvalidName(String),

    /// Local filesystem failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the remote object store
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Storage configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with StorageError
pub type StorageResult<T> = Result<T, StorageError>;
