//! # Ingestion Orchestrator
//!
//! Sequences the pipeline for each file and isolates per-file failures.
//!
//! ## Per-File Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  path                                                                   │
//! │   │  guard: .xml extension, size ≤ max_file_size_bytes                  │
//! │   ▼                                                                     │
//! │  read bytes (tokio::fs) ──► parse_bytes ──► extract_invoice             │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                         PriceNormalizer::normalize                      │
//! │                                              │                          │
//! │                                              ▼                          │
//! │            InvoiceStore::persist / replace / replace_invoice (one tx)   │
//! │                                                                         │
//! │  The first failing stage ends the file; later stages never run.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Batches
//! Files run strictly one after another. A failed file becomes a
//! `{ filename, success: false, error }` entry and the batch continues;
//! files already committed are unaffected. Results keep input order.
//!
//! Input files are never deleted here; the upload collaborator owns them.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{IngestConfig, LimitSettings};
use crate::error::{FileError, IngestError, IngestResult};
use crate::report::{BatchReport, FileOutcome};
use farma_core::{extract_invoice, parse_bytes, IngestSummary, NormalizedInvoice, PriceNormalizer};
use farma_db::{Database, InvoiceDetail, PersistedInvoice};

/// A successfully ingested file.
#[derive(Debug, Clone)]
pub struct IngestedInvoice {
    /// The normalized record that was persisted.
    pub invoice: NormalizedInvoice,
    pub persisted: PersistedInvoice,
}

impl IngestedInvoice {
    pub fn summary(&self) -> IngestSummary {
        self.invoice.summary()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode<'a> {
    Persist,
    Replace { target: Option<&'a str> },
}

/// Runs the ingestion pipeline against one database.
#[derive(Debug, Clone)]
pub struct Ingestor {
    db: Database,
    normalizer: PriceNormalizer,
    limits: LimitSettings,
}

impl Ingestor {
    /// Creates an ingestor from already-built parts.
    pub fn new(db: Database, normalizer: PriceNormalizer, limits: LimitSettings) -> Self {
        Ingestor {
            db,
            normalizer,
            limits,
        }
    }

    /// Opens the configured database (running migrations) and builds an ingestor.
    pub async fn from_config(config: &IngestConfig) -> IngestResult<Self> {
        let db = Database::new(config.db_config()).await?;
        Ok(Self::new(db, config.normalizer(), config.limits.clone()))
    }

    /// Returns the underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Single File
    // =========================================================================

    /// Ingests one file, appending its line items.
    ///
    /// ## Errors
    /// `IngestError::File` naming `path` for any stage failure; nothing is
    /// persisted in that case.
    pub async fn ingest(&self, path: &Path) -> IngestResult<IngestedInvoice> {
        self.run(path, WriteMode::Persist)
            .await
            .map_err(|source| IngestError::file(path, source))
    }

    /// Re-ingests a file, replacing any stored copy of the same invoice.
    ///
    /// With `target`, the stored invoice with that id is replaced as well,
    /// so a corrected file can supersede an invoice whose access key differs.
    /// The previous rows stay in place if any stage fails.
    pub async fn reprocess(
        &self,
        path: &Path,
        target: Option<&str>,
    ) -> IngestResult<IngestedInvoice> {
        self.run(path, WriteMode::Replace { target })
            .await
            .map_err(|source| IngestError::file(path, source))
    }

    async fn run(&self, path: &Path, mode: WriteMode<'_>) -> Result<IngestedInvoice, FileError> {
        let invoice = self.prepare(path).await?;

        let store = self.db.invoice_store();
        let persisted = match mode {
            WriteMode::Persist => store.persist(&invoice).await?,
            WriteMode::Replace { target: None } => store.replace(&invoice).await?,
            WriteMode::Replace {
                target: Some(invoice_id),
            } => store.replace_invoice(invoice_id, &invoice).await?,
        };

        info!(
            file = %path.display(),
            number = %invoice.invoice.number,
            items = persisted.item_count,
            "File ingested"
        );

        Ok(IngestedInvoice { invoice, persisted })
    }

    /// Guard, read, parse, extract and normalize. No database access.
    async fn prepare(&self, path: &Path) -> Result<NormalizedInvoice, FileError> {
        if !has_xml_extension(path) {
            return Err(FileError::NotXml);
        }

        let size = tokio::fs::metadata(path).await?.len();
        if size > self.limits.max_file_size_bytes {
            return Err(FileError::TooLarge {
                size,
                max: self.limits.max_file_size_bytes,
            });
        }

        let bytes = tokio::fs::read(path).await?;
        let document = parse_bytes(&bytes)?;
        let record = extract_invoice(&document)?;

        Ok(self.normalizer.normalize(record)?)
    }

    // =========================================================================
    // Batch
    // =========================================================================

    /// Ingests files in order, one result per file.
    ///
    /// ## Errors
    /// Only for the batch as a whole: `EmptyBatch` or `BatchTooLarge`.
    /// Per-file failures are reported inside the `BatchReport`.
    pub async fn ingest_batch(&self, paths: &[PathBuf]) -> IngestResult<BatchReport> {
        if paths.is_empty() {
            return Err(IngestError::EmptyBatch);
        }
        if paths.len() > self.limits.max_batch_files {
            return Err(IngestError::BatchTooLarge {
                count: paths.len(),
                max: self.limits.max_batch_files,
            });
        }

        info!(files = paths.len(), "Processing batch");

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let filename = display_name(path);
            let outcome = match self.run(path, WriteMode::Persist).await {
                Ok(ingested) => FileOutcome::succeeded(filename, ingested.summary()),
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "File failed");
                    FileOutcome::failed(filename, &err)
                }
            };
            results.push(outcome);
        }

        let report = BatchReport::from_outcomes(results);
        info!(
            succeeded = report.success_count,
            failed = report.error_count,
            "Batch complete"
        );
        Ok(report)
    }

    // =========================================================================
    // Stored Invoices
    // =========================================================================

    /// Deletes a stored invoice by id; returns the number of items removed.
    pub async fn delete(&self, invoice_id: &str) -> IngestResult<u64> {
        Ok(self.db.invoice_store().delete(invoice_id).await?)
    }

    /// Looks up a stored invoice with its items by access key.
    pub async fn show(&self, access_key: &str) -> IngestResult<Option<InvoiceDetail>> {
        Ok(self.db.invoices().detail(access_key).await?)
    }
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================
