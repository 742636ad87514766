//! # Invoice Repository
//!
//! Invoices (`notas`) and their line items (`itens_nota`).
//!
//! ## Identity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  notas.chave_acesso   UNIQUE  → upsert updates numero, serie,          │
//! │                                 data_emissao, valor_total in place     │
//! │  notas.(numero,serie) indexed → lookup only                            │
//! │  itens_nota           append-only; removed with their invoice          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::to_real;
use crate::error::DbResult;
use farma_core::{InvoiceHeader, PricedItem};

// =============================================================================
// Rows
// =============================================================================

/// A row of `notas` joined with its supplier.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct InvoiceRow {
    pub id: String,
    pub access_key: String,
    pub number: String,
    pub series: String,
    pub issued_at: String,
    pub total: f64,
    pub supplier_id: String,
    pub supplier_cnpj: String,
    pub supplier_name: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A row of `itens_nota` joined with its product.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LineItemRow {
    pub id: String,
    pub sequence: i64,
    pub product_id: String,
    pub product_code: String,
    pub product_name: String,
    pub manufacturer: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub gross_total: f64,
    pub discount: f64,
    pub net_unit_price: f64,
    pub discount_percentage: f64,
    pub additional_info: Option<String>,
}

/// An invoice with its line items in sequence order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: InvoiceRow,
    pub items: Vec<LineItemRow>,
}

const INVOICE_SELECT: &str = r#"
    SELECT
        n.id,
        n.chave_acesso AS access_key,
        n.numero AS number,
        n.serie AS series,
        n.data_emissao AS issued_at,
        n.valor_total AS total,
        f.id AS supplier_id,
        f.cnpj AS supplier_cnpj,
        f.nome AS supplier_name,
        n.created_at,
        n.updated_at
    FROM notas n
    JOIN fornecedores f ON f.id = n.fornecedor_id
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for invoice database operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Inserts the invoice or updates number, series, emission and total,
    /// returning the id.
    pub async fn upsert(
        conn: &mut SqliteConnection,
        header: &InvoiceHeader,
        supplier_id: &str,
    ) -> DbResult<String> {
        debug!(access_key = %header.access_key, number = %header.number, "Upserting invoice");

        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO notas (id, chave_acesso, numero, serie, data_emissao, valor_total, fornecedor_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(chave_acesso) DO UPDATE SET
                numero = excluded.numero,
                serie = excluded.serie,
                data_emissao = excluded.data_emissao,
                valor_total = excluded.valor_total,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&header.access_key)
        .bind(&header.number)
        .bind(&header.series)
        .bind(header.issued_at.to_rfc3339())
        .bind(to_real(header.total))
        .bind(supplier_id)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }

    /// Appends one line item. Never updates an existing row.
    pub async fn insert_item(
        conn: &mut SqliteConnection,
        invoice_id: &str,
        product_id: &str,
        priced: &PricedItem,
    ) -> DbResult<String> {
        let item = &priced.item;
        let id = Uuid::new_v4().to_string();

        debug!(invoice_id = %invoice_id, sequence = item.sequence, "Inserting line item");

        sqlx::query(
            r#"
            INSERT INTO itens_nota (
                id, nota_id, produto_id, item,
                quantidade, valor_unitario, valor_total, desconto,
                valor_liquido, percentual_desconto, info_adicional
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8,
                ?9, ?10, ?11
            )
            "#,
        )
        .bind(&id)
        .bind(invoice_id)
        .bind(product_id)
        .bind(i64::from(item.sequence))
        .bind(to_real(item.quantity))
        .bind(to_real(item.unit_price))
        .bind(to_real(item.gross_total))
        .bind(to_real(item.discount))
        .bind(to_real(priced.net_unit_price))
        .bind(to_real(priced.discount_percentage))
        .bind(&item.additional_info)
        .execute(conn)
        .await?;

        Ok(id)
    }

    /// Finds the invoice id for an access key.
    pub async fn find_id_by_access_key(
        conn: &mut SqliteConnection,
        access_key: &str,
    ) -> DbResult<Option<String>> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM notas WHERE chave_acesso = ?1")
                .bind(access_key)
                .fetch_optional(conn)
                .await?;
        Ok(id)
    }

    /// Deletes an invoice and its line items.
    ///
    /// ## Returns
    /// `(invoices_deleted, items_deleted)`; `(0, 0)` when the id is unknown.
    pub async fn delete(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<(u64, u64)> {
        debug!(invoice_id = %invoice_id, "Deleting invoice");

        let items = sqlx::query("DELETE FROM itens_nota WHERE nota_id = ?1")
            .bind(invoice_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        let invoices = sqlx::query("DELETE FROM notas WHERE id = ?1")
            .bind(invoice_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        Ok((invoices, items))
    }

    /// Gets an invoice by access key.
    pub async fn get_by_access_key(&self, access_key: &str) -> DbResult<Option<InvoiceRow>> {
        let sql = format!("{INVOICE_SELECT} WHERE n.chave_acesso = ?1");
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(access_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Gets an invoice by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<InvoiceRow>> {
        let sql = format!("{INVOICE_SELECT} WHERE n.id = ?1");
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Lists invoices sharing a number and series, newest emission first.
    pub async fn find_by_number(&self, number: &str, series: &str) -> DbResult<Vec<InvoiceRow>> {
        let sql = format!(
            "{INVOICE_SELECT} WHERE n.numero = ?1 AND n.serie = ?2 ORDER BY n.data_emissao DESC"
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(number)
            .bind(series)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Lists the line items of an invoice in sequence order.
    pub async fn list_items(&self, invoice_id: &str) -> DbResult<Vec<LineItemRow>> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r#"
            SELECT
                i.id,
                i.item AS sequence,
                p.id AS product_id,
                p.codigo AS product_code,
                p.nome AS product_name,
                p.fabricante AS manufacturer,
                i.quantidade AS quantity,
                i.valor_unitario AS unit_price,
                i.valor_total AS gross_total,
                i.desconto AS discount,
                i.valor_liquido AS net_unit_price,
                i.percentual_desconto AS discount_percentage,
                i.info_adicional AS additional_info
            FROM itens_nota i
            JOIN produtos p ON p.id = i.produto_id
            WHERE i.nota_id = ?1
            ORDER BY i.item, i.created_at
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Gets an invoice with its line items by access key.
    pub async fn detail(&self, access_key: &str) -> DbResult<Option<InvoiceDetail>> {
        let Some(invoice) = self.get_by_access_key(access_key).await? else {
            return Ok(None);
        };
        let items = self.list_items(&invoice.id).await?;
        Ok(Some(InvoiceDetail { invoice, items }))
    }

    /// Counts all invoices.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notas")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Counts the line items stored for an access key.
    pub async fn count_items_for_access_key(&self, access_key: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM itens_nota i
            JOIN notas n ON n.id = i.nota_id
            WHERE n.chave_acesso = ?1
            "#,
        )
        .bind(access_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
