//! # farma-db: Database Layer for Farma Compras
//!
//! Stores normalized NFe invoices in SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Ingestion Data Flow                                 │
//! │                                                                         │
//! │  farma-ingest (orchestrator)                                           │
//! │       │  NormalizedInvoice (from farma-core)                            │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     farma-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ InvoiceStore  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (persist.rs)  │    │  (embedded)  │  │   │
//! │  │   │               │    │  one tx per   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│  invoice      │    │ 001_init.sql │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                ▼                               │   │
//! │  │                  Supplier / Product / Invoice repositories     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  fornecedores, produtos, notas, itens_nota                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`persist`] - Atomic invoice persistence (append, replace, delete)
//! - [`repository`] - Per-table upserts and read-backs
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use farma_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("farma.db")).await?;
//! let persisted = db.invoice_store().persist(&normalized).await?;
//! let detail = db.invoices().detail(&normalized.invoice.access_key).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod persist;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use persist::{InvoiceStore, PersistedInvoice};
pub use pool::{Database, DbConfig};

pub use repository::invoice::{InvoiceDetail, InvoiceRepository, InvoiceRow, LineItemRow};
pub use repository::product::{ProductRepository, ProductRow};
pub use repository::supplier::{SupplierRepository, SupplierRow};
