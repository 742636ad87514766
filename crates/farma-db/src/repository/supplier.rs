//! # Supplier Repository
//!
//! Suppliers are keyed by CNPJ. The first invoice from a CNPJ creates the
//! row; later invoices overwrite name, trade name and address
//! (last write wins). Ingestion never deletes suppliers.

use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use farma_core::Supplier;

/// A row of `fornecedores`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct SupplierRow {
    pub id: String,
    pub cnpj: String,
    pub legal_name: String,
    pub trade_name: Option<String>,
    pub address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Repository for supplier database operations.
#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    /// Creates a new SupplierRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SupplierRepository { pool }
    }

    /// Inserts the supplier or updates its mutable fields, returning the id.
    ///
    /// The id of an existing row never changes.
    pub async fn upsert(conn: &mut SqliteConnection, supplier: &Supplier) -> DbResult<String> {
        debug!(cnpj = %supplier.cnpj, "Upserting supplier");

        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO fornecedores (id, cnpj, nome, nome_fantasia, endereco_completo)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(cnpj) DO UPDATE SET
                nome = excluded.nome,
                nome_fantasia = excluded.nome_fantasia,
                endereco_completo = excluded.endereco_completo,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&supplier.cnpj)
        .bind(&supplier.legal_name)
        .bind(&supplier.trade_name)
        .bind(&supplier.address)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }

    /// Gets a supplier by CNPJ.
    pub async fn get_by_cnpj(&self, cnpj: &str) -> DbResult<Option<SupplierRow>> {
        let row = sqlx::query_as::<_, SupplierRow>(
            r#"
            SELECT
                id,
                cnpj,
                nome AS legal_name,
                nome_fantasia AS trade_name,
                endereco_completo AS address,
                created_at,
                updated_at
            FROM fornecedores
            WHERE cnpj = ?1
            "#,
        )
        .bind(cnpj)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Counts all suppliers.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fornecedores")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn supplier(name: &str, address: &str) -> Supplier {
        Supplier {
            cnpj: "12345678000195".to_string(),
            legal_name: name.to_string(),
            trade_name: name.to_string(),
            address: address.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_id_and_last_values() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let (first, second) = {
            let mut conn = db.pool().acquire().await.unwrap();
            let first = SupplierRepository::upsert(&mut conn, &supplier("ABC LTDA", "RUA A"))
                .await
                .unwrap();
            let second =
                SupplierRepository::upsert(&mut conn, &supplier("ABC DISTRIBUIDORA", "RUA B"))
                    .await
                    .unwrap();
            (first, second)
        };

        assert_eq!(first, second);
        assert_eq!(db.suppliers().count().await.unwrap(), 1);

        let row = db
            .suppliers()
            .get_by_cnpj("12345678000195")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.legal_name, "ABC DISTRIBUIDORA");
        assert_eq!(row.address.as_deref(), Some("RUA B"));
    }

    #[tokio::test]
    async fn test_unknown_cnpj() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.suppliers().get_by_cnpj("000").await.unwrap().is_none());
    }
}
