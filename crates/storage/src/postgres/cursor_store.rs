//! Cursor persistence for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use enzyme_core::error::{StoreError, StoreResult};
use enzyme_core::models::IndexerCursor;
use enzyme_core::ports::CursorStore;

use super::database::Database;

/// PostgreSQL implementation of [`CursorStore`].
pub struct PgCursorStore {
    pool: PgPool,
}

impl PgCursorStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl CursorStore for PgCursorStore {
    async fn get_cursor(&self, chain_id: &str) -> StoreResult<Option<IndexerCursor>> {
        let row = sqlx::query_as::<_, CursorRow>(
            r#"
            SELECT chain_id, last_indexed_block, updated_at
            FROM indexer_cursor
            WHERE chain_id = $1
            "#,
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryError(e.to_string()))?;

        Ok(row.map(CursorRow::into_cursor))
    }

    async fn get_any_cursor(&self) -> StoreResult<Option<IndexerCursor>> {
        let row = sqlx::query_as::<_, CursorRow>(
            r#"
            SELECT chain_id, last_indexed_block, updated_at
            FROM indexer_cursor
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryError(e.to_string()))?;

        Ok(row.map(CursorRow::into_cursor))
    }

    async fn set_cursor(&self, cursor: &IndexerCursor) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO indexer_cursor (chain_id, last_indexed_block, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (chain_id) DO UPDATE SET
                last_indexed_block = EXCLUDED.last_indexed_block,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&cursor.chain_id)
        .bind(cursor.last_indexed_block as i64)
        .bind(cursor.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryError(e.to_string()))?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CursorRow {
    chain_id: String,
    last_indexed_block: i64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl CursorRow {
    fn into_cursor(self) -> IndexerCursor {
        IndexerCursor {
            chain_id: self.chain_id,
            last_indexed_block: self.last_indexed_block as u64,
            updated_at: self.updated_at,
        }
    }
}
