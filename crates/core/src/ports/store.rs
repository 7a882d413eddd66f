//! Port traits for the entity store and the indexer cursor.
//!
//! The store is a document store: (kind, id) → JSON document. Handlers mutate
//! entities through read-modify-write; `put` overwrites the whole document and
//! is visible to every subsequent `get` (read-your-writes). Implementations
//! live in the infrastructure layer (`enzyme-storage`) and in-process for
//! tests ([`crate::store::MemoryStore`]).

use async_trait::async_trait;

use crate::entities::{Entity, EntityKind};
use crate::error::{StoreError, StoreResult};
use crate::models::IndexerCursor;

/// Object-safe document store port.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Load the current snapshot of a document, or `None`.
    async fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<serde_json::Value>>;

    /// Idempotent upsert of the full document (last-write-wins).
    async fn put(&self, kind: EntityKind, id: &str, doc: serde_json::Value) -> StoreResult<()>;

    /// Delete a document. Returns whether it existed.
    async fn delete(&self, kind: EntityKind, id: &str) -> StoreResult<bool>;

    /// Id-ordered page of all documents of a kind.
    async fn list(
        &self,
        kind: EntityKind,
        first: u32,
        skip: u32,
    ) -> StoreResult<Vec<serde_json::Value>>;

    /// Id-ordered page of documents whose top-level string `field` equals
    /// `value` (the reference-field traversal the query surface builds on).
    async fn find_by(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
        first: u32,
        skip: u32,
    ) -> StoreResult<Vec<serde_json::Value>>;

    /// Number of documents of a kind.
    async fn count(&self, kind: EntityKind) -> StoreResult<u64>;
}

/// Typed load/save/remove over the document port.
///
/// Handlers work against this layer; (de)serialization failures surface as
/// [`StoreError::SerializationError`].
#[async_trait]
pub trait EntityStoreExt {
    async fn load<E: Entity>(&self, id: &str) -> StoreResult<Option<E>>;
    async fn save<E: Entity>(&self, entity: &E) -> StoreResult<()>;
    async fn remove<E: Entity>(&self, id: &str) -> StoreResult<bool>;
}

#[async_trait]
impl<S: EntityStore + ?Sized> EntityStoreExt for S {
    async fn load<E: Entity>(&self, id: &str) -> StoreResult<Option<E>> {
        match self.get(E::KIND, id).await? {
            Some(doc) => serde_json::from_value(doc)
                .map(Some)
                .map_err(|e| StoreError::SerializationError(format!("{} {}: {}", E::KIND, id, e))),
            None => Ok(None),
        }
    }

    async fn save<E: Entity>(&self, entity: &E) -> StoreResult<()> {
        let doc = serde_json::to_value(entity)
            .map_err(|e| StoreError::SerializationError(format!("{}: {}", E::KIND, e)))?;
        self.put(E::KIND, entity.id(), doc).await
    }

    async fn remove<E: Entity>(&self, id: &str) -> StoreResult<bool> {
        self.delete(E::KIND, id).await
    }
}

/// Port for indexer cursor persistence.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Get the cursor for a chain.
    async fn get_cursor(&self, chain_id: &str) -> StoreResult<Option<IndexerCursor>>;

    /// Get any existing cursor (chain mismatch detection).
    async fn get_any_cursor(&self) -> StoreResult<Option<IndexerCursor>>;

    /// Upsert the cursor.
    async fn set_cursor(&self, cursor: &IndexerCursor) -> StoreResult<()>;
}
