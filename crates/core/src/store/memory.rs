//! In-memory entity store and cursor.
//!
//! BTreeMap-backed so iteration order, and therefore [`MemoryStore::snapshot`],
//! is deterministic — replay comparison tests diff two snapshots byte for
//! byte. Also the store of choice for handler unit tests.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::entities::EntityKind;
use crate::error::StoreResult;
use crate::models::IndexerCursor;
use crate::ports::{CursorStore, EntityStore};

type Documents = BTreeMap<EntityKind, BTreeMap<String, serde_json::Value>>;

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic dump of the whole store: kinds in stable order, ids
    /// ascending, documents with sorted keys. Two replays over the same
    /// event log must produce identical snapshots.
    pub fn snapshot(&self) -> String {
        let map = self.read();
        let mut out = String::new();
        for (kind, docs) in map.iter() {
            for (id, doc) in docs {
                out.push_str(&format!("{}:{}={}\n", kind, id, canonical_json(doc)));
            }
        }
        out
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Documents> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Documents> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Render a JSON value with object keys sorted at every level.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by_key(|(k, _)| *k);
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::Value::from(k.as_str()), canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        serde_json::Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<serde_json::Value>> {
        Ok(self.read().get(&kind).and_then(|docs| docs.get(id)).cloned())
    }

    async fn put(&self, kind: EntityKind, id: &str, doc: serde_json::Value) -> StoreResult<()> {
        self.write().entry(kind).or_default().insert(id.to_string(), doc);
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        Ok(self
            .write()
            .get_mut(&kind)
            .is_some_and(|docs| docs.remove(id).is_some()))
    }

    async fn list(
        &self,
        kind: EntityKind,
        first: u32,
        skip: u32,
    ) -> StoreResult<Vec<serde_json::Value>> {
        Ok(self
            .read()
            .get(&kind)
            .map(|docs| {
                docs.values()
                    .skip(skip as usize)
                    .take(first as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_by(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
        first: u32,
        skip: u32,
    ) -> StoreResult<Vec<serde_json::Value>> {
        Ok(self
            .read()
            .get(&kind)
            .map(|docs| {
                docs.values()
                    .filter(|doc| doc.get(field).and_then(|v| v.as_str()) == Some(value))
                    .skip(skip as usize)
                    .take(first as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, kind: EntityKind) -> StoreResult<u64> {
        Ok(self.read().get(&kind).map(|docs| docs.len() as u64).unwrap_or(0))
    }
}

/// In-memory cursor store.
#[derive(Default)]
pub struct MemoryCursor {
    inner: RwLock<BTreeMap<String, IndexerCursor>>,
}

impl MemoryCursor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursor {
    async fn get_cursor(&self, chain_id: &str) -> StoreResult<Option<IndexerCursor>> {
        let map = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(map.get(chain_id).cloned())
    }

    async fn get_any_cursor(&self) -> StoreResult<Option<IndexerCursor>> {
        let map = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(map.values().next().cloned())
    }

    async fn set_cursor(&self, cursor: &IndexerCursor) -> StoreResult<()> {
        let mut map = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.insert(cursor.chain_id.clone(), cursor.clone());
        Ok(())
    }
}
