//! Error types for Postboard
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized for the command line output.

use crate::validation::ValidationErrors;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Post not found: {0}")]
    PostNotFound(String),

    #[error("Failed to store image: {0}")]
    StorageWriteFailed(String),

    #[error("Failed to delete image: {0}")]
    StorageDeleteFailed(String),

    #[error("Failed to write post record: {0}")]
    RecordWriteFailed(String),

    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    #[error("Blob store error: {0}")]
    BlobStore(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Stable machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::PostNotFound(_) => "NOT_FOUND",
            AppError::StorageWriteFailed(_) => "STORAGE_WRITE_FAILED",
            AppError::StorageDeleteFailed(_) => "STORAGE_DELETE_FAILED",
            AppError::RecordWriteFailed(_) => "RECORD_WRITE_FAILED",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Database(_)
            | AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::BlobStore(_) => "INTERNAL_ERROR",
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
