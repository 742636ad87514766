//! # Domain Types
//!
//! Canonical records produced by extraction and normalization.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Invoice Records                                 │
//! │                                                                         │
//! │  InvoiceRecord (extract)          NormalizedInvoice (pricing)           │
//! │  ├── invoice: InvoiceHeader       ├── invoice: InvoiceHeader            │
//! │  ├── supplier: Supplier           ├── supplier: Supplier                │
//! │  └── items: Vec<LineItem>         └── items: Vec<PricedItem>            │
//! │                                          ├── item: LineItem             │
//! │  LineItem                                ├── net_unit_price             │
//! │  ├── sequence (1-based)                  ├── discount_percentage        │
//! │  ├── product: ProductInfo                └── manufacturer               │
//! │  └── quantity / prices / info                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Natural Keys
//! - Supplier: `cnpj`
//! - Product: `code` (global across suppliers)
//! - Invoice: `access_key` (44 digits); `(number, series)` is informational

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Supplier
// =============================================================================

/// The issuer (`emit`) of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    /// Tax id, digits only.
    pub cnpj: String,

    /// Legal name (`xNome`).
    pub legal_name: String,

    /// Trade name (`xFant`), or the legal name when absent.
    pub trade_name: String,

    /// Address fields joined with ", ", empty fields omitted.
    pub address: String,
}

// =============================================================================
// Invoice Header
// =============================================================================

/// Invoice-level fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    /// 44-digit access key, without the `NFe` prefix.
    pub access_key: String,

    /// Invoice number (`nNF`).
    pub number: String,

    /// Series (`serie`), empty when absent.
    pub series: String,

    /// Emission timestamp (`dhEmi`, or midnight UTC of `dEmi`).
    pub issued_at: DateTime<FixedOffset>,

    /// Declared total (`vNF`), zero when absent.
    pub total: Decimal,
}

// =============================================================================
// Product & Line Item
// =============================================================================

/// Descriptive product fields as printed on the invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    /// Supplier-assigned product code (`cProd`).
    pub code: String,

    /// Barcode (`cEAN`, falling back to `cEANTrib`).
    pub barcode: Option<String>,

    /// Full descriptive name (`xProd`).
    pub name: String,

    /// Tax classification code (`NCM`).
    pub ncm: Option<String>,

    /// Commercial unit (`uCom`).
    pub unit: Option<String>,
}

/// One `det` entry as stated on the invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// 1-based position within the invoice.
    pub sequence: u32,
    pub product: ProductInfo,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub gross_total: Decimal,
    pub discount: Decimal,

    /// Free-text annotation (`infAdProd`); may carry discount markers.
    pub additional_info: Option<String>,
}

/// Output of the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice: InvoiceHeader,
    pub supplier: Supplier,
    pub items: Vec<LineItem>,
}

// =============================================================================
// Normalized Records
// =============================================================================

/// A line item with its computed prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedItem {
    pub item: LineItem,

    /// Unit price after the supplier's effective discount, 2 decimal places
    /// when a discount applied.
    pub net_unit_price: Decimal,

    /// Discount percentage found in the annotation (0 when none applied).
    pub discount_percentage: Decimal,

    /// Manufacturer label derived from the product name.
    pub manufacturer: String,
}

/// Output of the price normalizer, input of the persistence engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedInvoice {
    pub invoice: InvoiceHeader,
    pub supplier: Supplier,
    pub items: Vec<PricedItem>,
}

impl NormalizedInvoice {
    /// Summary reported back to the caller for a successful file.
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            invoice_number: self.invoice.number.clone(),
            supplier_name: self.supplier.legal_name.clone(),
            item_count: self.items.len(),
        }
    }
}

/// Per-file success summary: `{ nota, fornecedor, itens }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IngestSummary {
    #[serde(rename = "nota")]
    pub invoice_number: String,

    #[serde(rename = "fornecedor")]
    pub supplier_name: String,

    #[serde(rename = "itens")]
    pub item_count: usize,
}
