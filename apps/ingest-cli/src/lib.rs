//! # farma-ingest: NFe Ingestion Orchestrator
//!
//! Turns NFe XML files into persisted purchase records, one transaction per
//! invoice, and reports the outcome of every file.
//!
//! ## Modules
//!
//! - [`orchestrator`] - `Ingestor`: single-file, batch, reprocess, delete, show
//! - [`config`] - `IngestConfig` (TOML + `FARMA_*` environment)
//! - [`report`] - `FileOutcome` / `BatchReport` (JSON, TypeScript bindings)
//! - [`error`] - `IngestError` / `FileError`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use farma_ingest::{IngestConfig, Ingestor};
//!
//! let config = IngestConfig::load(None)?;
//! let ingestor = Ingestor::from_config(&config).await?;
//! let report = ingestor.ingest_batch(&paths).await?;
//! println!("{}", report.message);
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod report;

pub use config::IngestConfig;
pub use error::{FileError, IngestError, IngestResult};
pub use orchestrator::{IngestedInvoice, Ingestor};
pub use report::{BatchReport, FileOutcome};
