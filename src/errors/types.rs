//! Error type definitions for the job queue

use sea_orm::DbErr;
use thiserror::Error;

/// Top-level job queue error type
#[derive(Error, Debug)]
pub enum JobQueueError {
    /// Malformed input rejected before any mutation
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Backend failure (connectivity, constraint violation, ...)
    #[error("Storage error during {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: DbErr,
    },

    /// A stored row holds a value the domain model cannot represent
    #[error("Corrupt row in {table} ({id}): {message}")]
    CorruptRow {
        table: &'static str,
        id: String,
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl JobQueueError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a corrupt row error
    pub fn corrupt_row<I: Into<String>, M: Into<String>>(
        table: &'static str,
        id: I,
        message: M,
    ) -> Self {
        Self::CorruptRow {
            table,
            id: id.into(),
            message: message.into(),
        }
    }

    /// Whether this error was caused by bad caller input
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Whether this error is a backend failure worth retrying later
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

/// Tags a SeaORM failure with the queue operation that produced it
pub trait StorageResultExt<T> {
    fn during(self, operation: &'static str) -> Result<T, JobQueueError>;
}

impl<T> StorageResultExt<T> for Result<T, DbErr> {
    fn during(self, operation: &'static str) -> Result<T, JobQueueError> {
        self.map_err(|source| JobQueueError::Storage { operation, source })
    }
}
