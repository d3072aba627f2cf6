use std::path::PathBuf;
use thiserror::Error;

use crate::sync::SyncStage;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to store {locator}: {source}")]
    Connection {
        locator: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Invalid store locator: {0}")]
    InvalidLocator(String),
    #[error("Store query failed: {0}")]
    Query(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Image encode failed: {0}")]
    Encode(#[source] image::ImageError),
}

/// Failure of a single candidate. Never escapes a run; it is recorded and counted.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Failed to read file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Duplicate check failed: {0}")]
    DuplicateCheck(#[source] StoreError),
    #[error(transparent)]
    Decode(#[from] ImageError),
    #[error("Insert failed: {0}")]
    Persist(#[source] StoreError),
}

impl ItemError {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::Read(_) => "read",
            ItemError::DuplicateCheck(_) => "duplicate_check",
            ItemError::Decode(_) => "decode",
            ItemError::Persist(_) => "persist",
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Root directory does not exist: {}", .0.display())]
    RootNotFound(PathBuf),
    #[error("Root path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("Failed to clear destination before import: {0}")]
    Clear(#[source] StoreError),
}

#[derive(Debug, Error)]
#[error("Synchronization aborted at {stage}: {source}")]
pub struct SyncError {
    pub stage: SyncStage,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No file uploaded")]
    Empty,
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("Failed to store photo: {0}")]
    Persist(#[from] StoreError),
}
