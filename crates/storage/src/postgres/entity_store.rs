//! Entity document store backed by a single JSONB table.
//!
//! Documents are keyed by (kind, id); writes are full-document upserts so
//! last-write-wins falls out of `ON CONFLICT DO UPDATE`. Reference-field
//! queries traverse top-level JSON keys with `doc->>`, backed by a GIN
//! index on the document column.

use async_trait::async_trait;
use sqlx::PgPool;

use enzyme_core::entities::EntityKind;
use enzyme_core::error::{StoreError, StoreResult};
use enzyme_core::ports::EntityStore;

use super::database::Database;

/// PostgreSQL implementation of [`EntityStore`].
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

fn query_err(e: sqlx::Error) -> StoreError {
    StoreError::QueryError(e.to_string())
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<serde_json::Value>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM entities WHERE kind = $1 AND id = $2")
                .bind(kind.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_err)?;

        Ok(row.map(|(doc,)| doc))
    }

    async fn put(&self, kind: EntityKind, id: &str, doc: serde_json::Value) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO entities (kind, id, doc, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (kind, id) DO UPDATE SET
                doc = EXCLUDED.doc,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(doc)
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM entities WHERE kind = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        kind: EntityKind,
        first: u32,
        skip: u32,
    ) -> StoreResult<Vec<serde_json::Value>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT doc FROM entities
            WHERE kind = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(kind.as_str())
        .bind(first as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(rows.into_iter().map(|(doc,)| doc).collect())
    }

    async fn find_by(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
        first: u32,
        skip: u32,
    ) -> StoreResult<Vec<serde_json::Value>> {
        // `field` is bound as a parameter into ->>, never interpolated, so
        // arbitrary caller input cannot escape into the SQL text.
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT doc FROM entities
            WHERE kind = $1 AND doc->>$2 = $3
            ORDER BY id
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(kind.as_str())
        .bind(field)
        .bind(value)
        .bind(first as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(rows.into_iter().map(|(doc,)| doc).collect())
    }

    async fn count(&self, kind: EntityKind) -> StoreResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities WHERE kind = $1")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(query_err)?;

        Ok(row.0 as u64)
    }
}
