//! # farma-core: Pure Ingestion Logic
//!
//! This crate turns the text of an NFe (Brazilian electronic invoice) into a
//! normalized purchase record. It has zero I/O dependencies: files are read
//! by the app layer and rows are written by `farma-db`.
//!
//! ## Pipeline Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        NFe Ingestion Pipeline                           │
//! │                                                                         │
//! │   raw XML text                                                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌──────────────┐   xml::parse_document    → XmlNode tree              │
//! │  │   xml        │   (purely syntactic)                                  │
//! │  └──────┬───────┘                                                       │
//! │         ▼                                                               │
//! │  ┌──────────────┐   extract::extract_invoice → InvoiceRecord           │
//! │  │   extract    │   (envelope, supplier, header, det items)             │
//! │  └──────┬───────┘                                                       │
//! │         ▼                                                               │
//! │  ┌──────────────┐   PriceNormalizer::normalize → NormalizedInvoice     │
//! │  │   pricing    │   (net unit price, discount %, manufacturer)          │
//! │  └──────┬───────┘                                                       │
//! │         ▼                                                               │
//! │   farma-db (persistence, NOT this crate)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`xml`] - Generic XML tree (`Scalar | Node | NodeList`)
//! - [`extract`] - NFe envelope location and field extraction
//! - [`pricing`] - Supplier-aware discount correction and manufacturer labels
//! - [`types`] - Canonical invoice records
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use farma_core::{extract_invoice, parse_document, PriceNormalizer};
//!
//! let tree = parse_document(&xml_text)?;
//! let record = extract_invoice(&tree)?;
//! let normalizer = PriceNormalizer::new(["PROFARMA"]);
//! let normalized = normalizer.normalize(record)?;
//! println!("{} items", normalized.items.len());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod extract;
pub mod pricing;
pub mod types;
pub mod xml;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use extract::extract_invoice;
pub use pricing::PriceNormalizer;
pub use types::*;
pub use xml::{parse_bytes, parse_document, XmlNode, XmlValue};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of digits in an NFe access key (chave de acesso).
pub const ACCESS_KEY_LEN: usize = 44;

/// Document-type prefix carried by the `infNFe` `Id` attribute (`NFe3524...`).
pub const ACCESS_KEY_PREFIX: &str = "NFe";

/// Manufacturer label used when none can be derived from the product name.
pub const MANUFACTURER_NOT_INFORMED: &str = "not informed";
