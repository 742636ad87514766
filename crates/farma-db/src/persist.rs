//! # Persistence Engine
//!
//! Writes one normalized invoice as an atomic unit.
//!
//! ## Transaction Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   │                                                                     │
//! │   ├── (replace only) delete itens_nota + notas for the access key      │
//! │   │    and for the target invoice id, when one is given                 │
//! │   │                                                                     │
//! │   ├── 1. upsert fornecedores ON CONFLICT(cnpj)        → supplier_id     │
//! │   ├── 2. upsert notas ON CONFLICT(chave_acesso)       → invoice_id      │
//! │   └── 3. for each item, in sequence order:                              │
//! │           upsert produtos ON CONFLICT(codigo)         → product_id      │
//! │           INSERT itens_nota (append)                                    │
//! │   │                                                                     │
//! │  COMMIT ── any failure above ──► ROLLBACK, nothing from this invoice    │
//! │                                   remains visible                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Classification
//! - Constraint violations pass through unchanged as `ConstraintViolation`.
//! - Everything else becomes `TransactionAborted { stage }`.
//!
//! ## Append vs Replace
//! [`InvoiceStore::persist`] appends line items: persisting the same invoice
//! twice leaves two copies of every item under one invoice row.
//! [`InvoiceStore::replace`] clears the previous rows for the access key in
//! the same transaction, so a failed replace keeps the old invoice intact.
//! [`InvoiceStore::replace_invoice`] also clears a named invoice, which lets a
//! corrected file (possibly with a different access key) take its place.

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::invoice::InvoiceRepository;
use crate::repository::product::ProductRepository;
use crate::repository::supplier::SupplierRepository;
use farma_core::NormalizedInvoice;

/// Identifiers produced by a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedInvoice {
    pub invoice_id: String,
    pub supplier_id: String,
    pub item_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode<'a> {
    Append,
    Replace { target: Option<&'a str> },
}

/// Transactional writer for whole invoices.
#[derive(Debug, Clone)]
pub struct InvoiceStore {
    pool: SqlitePool,
}

impl InvoiceStore {
    /// Creates a new InvoiceStore.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceStore { pool }
    }

    /// Persists an invoice, appending its line items.
    ///
    /// ## Errors
    /// - `ConstraintViolation` when a constraint rejects a row
    /// - `TransactionAborted` for any other fault; nothing is written
    pub async fn persist(&self, invoice: &NormalizedInvoice) -> DbResult<PersistedInvoice> {
        self.write(invoice, WriteMode::Append).await
    }

    /// Replaces any stored copy of the invoice (same access key) with this one.
    pub async fn replace(&self, invoice: &NormalizedInvoice) -> DbResult<PersistedInvoice> {
        self.write(invoice, WriteMode::Replace { target: None }).await
    }

    /// Replaces the stored invoice `invoice_id` (and any stored copy with the
    /// same access key) with this one.
    ///
    /// ## Errors
    /// `NotFound` when no invoice has this id; nothing is written.
    pub async fn replace_invoice(
        &self,
        invoice_id: &str,
        invoice: &NormalizedInvoice,
    ) -> DbResult<PersistedInvoice> {
        self.write(
            invoice,
            WriteMode::Replace {
                target: Some(invoice_id),
            },
        )
        .await
    }

    /// Deletes an invoice and its line items by invoice id.
    ///
    /// ## Returns
    /// Number of line items removed.
    ///
    /// ## Errors
    /// `NotFound` when no invoice has this id.
    pub async fn delete(&self, invoice_id: &str) -> DbResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::aborted("begin", e))?;

        let (invoices, items) = InvoiceRepository::delete(&mut tx, invoice_id)
            .await
            .map_err(|e| at_stage("delete", e))?;

        if invoices == 0 {
            tx.rollback()
                .await
                .map_err(|e| DbError::aborted("rollback", e))?;
            return Err(DbError::not_found("Invoice", invoice_id));
        }

        tx.commit()
            .await
            .map_err(|e| at_stage("commit", e.into()))?;

        info!(invoice_id = %invoice_id, items, "Invoice deleted");
        Ok(items)
    }

    async fn write(
        &self,
        invoice: &NormalizedInvoice,
        mode: WriteMode<'_>,
    ) -> DbResult<PersistedInvoice> {
        let access_key = &invoice.invoice.access_key;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| at_stage("begin", e.into()))?;

        match write_steps(&mut tx, invoice, mode).await {
            Ok(persisted) => {
                tx.commit()
                    .await
                    .map_err(|e| at_stage("commit", e.into()))?;

                info!(
                    access_key = %access_key,
                    invoice_id = %persisted.invoice_id,
                    items = persisted.item_count,
                    "Invoice persisted"
                );
                Ok(persisted)
            }
            Err(err) => {
                warn!(access_key = %access_key, error = %err, "Rolling back invoice");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed; connection will be discarded");
                }
                Err(err)
            }
        }
    }
}

async fn write_steps(
    conn: &mut SqliteConnection,
    invoice: &NormalizedInvoice,
    mode: WriteMode<'_>,
) -> DbResult<PersistedInvoice> {
    if let WriteMode::Replace { target } = mode {
        clear_previous(conn, &invoice.invoice.access_key, target).await?;
    }

    let supplier_id = SupplierRepository::upsert(conn, &invoice.supplier)
        .await
        .map_err(|e| at_stage("supplier upsert", e))?;

    let invoice_id = InvoiceRepository::upsert(conn, &invoice.invoice, &supplier_id)
        .await
        .map_err(|e| at_stage("invoice upsert", e))?;

    for priced in &invoice.items {
        let stage = format!("item {}", priced.item.sequence);

        let product_id =
            ProductRepository::upsert(conn, &priced.item.product, &priced.manufacturer)
                .await
                .map_err(|e| at_stage(&stage, e))?;

        InvoiceRepository::insert_item(conn, &invoice_id, &product_id, priced)
            .await
            .map_err(|e| at_stage(&stage, e))?;
    }

    Ok(PersistedInvoice {
        invoice_id,
        supplier_id,
        item_count: invoice.items.len(),
    })
}

/// Deletes the target invoice and whatever is stored under `access_key`.
async fn clear_previous(
    conn: &mut SqliteConnection,
    access_key: &str,
    target: Option<&str>,
) -> DbResult<()> {
    let mut ids: Vec<String> = target.map(str::to_string).into_iter().collect();

    let existing = InvoiceRepository::find_id_by_access_key(conn, access_key)
        .await
        .map_err(|e| at_stage("clear previous", e))?;
    if let Some(existing) = existing {
        if !ids.contains(&existing) {
            ids.push(existing);
        }
    }

    for id in ids {
        let (invoices, items) = InvoiceRepository::delete(conn, &id)
            .await
            .map_err(|e| at_stage("clear previous", e))?;

        if invoices == 0 && target == Some(id.as_str()) {
            return Err(DbError::not_found("Invoice", &id));
        }
        debug!(invoice_id = %id, items, "Cleared previous invoice");
    }
    Ok(())
}

/// Keeps constraint violations as they are and wraps everything else.
fn at_stage(stage: &str, err: DbError) -> DbError {
    if err.is_constraint_violation() {
        err
    } else {
        DbError::aborted(stage, err)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
