//! # Ingestion Errors
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  IngestError                                                            │
//! │  ├── File { path, source: FileError }   one file failed; batch goes on │
//! │  │     ├── Io          read failure                                     │
//! │  │     ├── TooLarge    over [limits] max_file_size_bytes                │
//! │  │     ├── NotXml      extension is not .xml                            │
//! │  │     ├── Core        MalformedDocument / InvalidInvoiceStructure      │
//! │  │     └── Db          ConstraintViolation / TransactionAborted / ...   │
//! │  ├── EmptyBatch        no files at all                                  │
//! │  ├── BatchTooLarge     more than [limits] max_batch_files               │
//! │  ├── Config            unreadable or invalid farma.toml                 │
//! │  └── Database          pool/migration failure, delete/show lookups      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use farma_core::CoreError;
use farma_db::DbError;
use thiserror::Error;

/// Why a single file could not be ingested.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("File has {size} bytes, limit is {max}")]
    TooLarge { size: u64, max: u64 },

    #[error("Only XML files are accepted")]
    NotXml,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Errors returned by the orchestrator and the CLI.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A stage failed for one file. Carries the originating path.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: FileError,
    },

    #[error("No files were provided")]
    EmptyBatch,

    #[error("Too many files: {count} (maximum {max})")]
    BatchTooLarge { count: usize, max: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl IngestError {
    /// Attaches a file path to a stage failure.
    pub fn file(path: impl Into<PathBuf>, source: impl Into<FileError>) -> Self {
        IngestError::File {
            path: path.into(),
            source: source.into(),
        }
    }
}

impl From<toml::de::Error> for IngestError {
    fn from(err: toml::de::Error) -> Self {
        IngestError::Config(err.to_string())
    }
}

/// Result type for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;
