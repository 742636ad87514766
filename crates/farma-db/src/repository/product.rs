//! # Product Repository
//!
//! Products are keyed by the supplier-assigned code, globally: two suppliers
//! using the same code share one row. Descriptive fields follow the most
//! recent invoice.

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use farma_core::ProductInfo;

/// A row of `produtos`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ProductRow {
    pub id: String,
    pub code: String,
    pub barcode: Option<String>,
    pub name: String,
    pub ncm: Option<String>,
    pub unit: Option<String>,
    pub manufacturer: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts the product or refreshes its descriptive fields, returning the id.
    pub async fn upsert(
        conn: &mut SqliteConnection,
        product: &ProductInfo,
        manufacturer: &str,
    ) -> DbResult<String> {
        debug!(code = %product.code, "Upserting product");

        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO produtos (id, codigo, codigo_barras, nome, ncm, unidade, fabricante)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(codigo) DO UPDATE SET
                codigo_barras = excluded.codigo_barras,
                nome = excluded.nome,
                ncm = excluded.ncm,
                unidade = excluded.unidade,
                fabricante = excluded.fabricante,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&product.code)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.ncm)
        .bind(&product.unit)
        .bind(manufacturer)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }

    /// Gets a product by its code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<ProductRow>> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT
                id,
                codigo AS code,
                codigo_barras AS barcode,
                nome AS name,
                ncm,
                unidade AS unit,
                fabricante AS manufacturer,
                created_at,
                updated_at
            FROM produtos
            WHERE codigo = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Counts all products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM produtos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
