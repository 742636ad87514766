//! # Repository Module
//!
//! Database repository implementations, one per relation.
//!
//! ## Read vs Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  WRITE (inside the invoice transaction, driven by InvoiceStore)        │
//! │     SupplierRepository::upsert(&mut conn, ..)   → supplier id          │
//! │     InvoiceRepository::upsert(&mut conn, ..)    → invoice id           │
//! │     ProductRepository::upsert(&mut conn, ..)    → product id           │
//! │     InvoiceRepository::insert_item(&mut conn, ..)                      │
//! │                                                                         │
//! │  READ (pool-backed, for the CLI and tests)                             │
//! │     db.suppliers().get_by_cnpj(..)                                     │
//! │     db.products().get_by_code(..)                                      │
//! │     db.invoices().detail(..)                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Write functions take a `&mut SqliteConnection` so the caller decides
//! the transaction boundary; they never open one themselves.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub mod invoice;
pub mod product;
pub mod supplier;

/// Converts an exact decimal to the REAL stored in SQLite.
pub(crate) fn to_real(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}
