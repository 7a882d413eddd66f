//! Dynamic data-source registry.
//!
//! Contracts deployed at runtime (fraction tokens, locking contracts) must
//! be indexed from the moment they appear. Handlers register them here with
//! an immutable context map that the dispatcher hands back on every later
//! event from that address — the child contract's own events carry no
//! back-reference to the aggregate that spawned it.
//!
//! Registration is idempotent per address (first writer wins) and mirrored
//! to the entity store as [`DataSourceRecord`] documents so a restart
//! restores delivery.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::DataSourceRecord;
use crate::models::Address;

// =============================================================================
// Source Context
// =============================================================================

/// One context value. Keys map to addresses, raw bytes, strings or integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContextValue {
    Address(Address),
    /// Arbitrary bytes, hex-encoded.
    Bytes(String),
    String(String),
    Uint(u64),
}

/// Immutable key-value context attached to a dynamic data source at
/// creation time. Readable only by that data source's handler invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceContext(BTreeMap<String, ContextValue>);

impl SourceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, key: &str, address: Address) -> Self {
        self.0.insert(key.to_string(), ContextValue::Address(address));
        self
    }

    pub fn with_bytes(mut self, key: &str, bytes: &[u8]) -> Self {
        self.0
            .insert(key.to_string(), ContextValue::Bytes(hex::encode(bytes)));
        self
    }

    pub fn with_string(mut self, key: &str, value: &str) -> Self {
        self.0
            .insert(key.to_string(), ContextValue::String(value.to_string()));
        self
    }

    pub fn with_uint(mut self, key: &str, value: u64) -> Self {
        self.0.insert(key.to_string(), ContextValue::Uint(value));
        self
    }

    pub fn address(&self, key: &str) -> Option<Address> {
        match self.0.get(key) {
            Some(ContextValue::Address(address)) => Some(*address),
            _ => None,
        }
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ContextValue::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn uint(&self, key: &str) -> Option<u64> {
        match self.0.get(key) {
            Some(ContextValue::Uint(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One registered dynamic contract watcher.
#[derive(Debug, Clone)]
pub struct DataSourceInstance {
    /// Handler template the contract's events route to.
    pub template: String,
    /// Watched contract address.
    pub address: Address,
    /// Immutable creation context.
    pub context: SourceContext,
    /// Block the registration happened in. Events are delivered from the
    /// creating event onward, which in-order processing gives for free.
    pub created_at_block: u64,
}

/// Address-keyed registry of dynamic data sources.
///
/// Interior mutability because handlers create entries mid-dispatch while
/// the dispatcher resolves against the same map. Processing is
/// single-threaded so contention is nil; the lock only guards the shared
/// reference.
#[derive(Default)]
pub struct DataSourceRegistry {
    inner: RwLock<HashMap<Address, Arc<DataSourceInstance>>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract for the given template. Idempotent per address:
    /// a second create for an already-watched address is a no-op returning
    /// false, so duplicate creation events never duplicate delivery.
    pub fn create(
        &self,
        template: &str,
        address: Address,
        context: SourceContext,
        created_at_block: u64,
    ) -> bool {
        let mut map = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if map.contains_key(&address) {
            debug!(%address, template, "data source already registered, skipping");
            return false;
        }

        map.insert(
            address,
            Arc::new(DataSourceInstance {
                template: template.to_string(),
                address,
                context,
                created_at_block,
            }),
        );
        debug!(%address, template, created_at_block, "data source registered");
        true
    }

    /// Restore a persisted registration (startup path, no logging of
    /// duplicates as re-restores are normal).
    pub fn restore(&self, record: &DataSourceRecord) -> bool {
        match Address::from_hex(&record.id) {
            Ok(address) => self.create(
                &record.template,
                address,
                record.context.clone(),
                record.created_at_block,
            ),
            Err(_) => false,
        }
    }

    /// Look up the instance watching `address`, if any.
    pub fn resolve(&self, address: &Address) -> Option<Arc<DataSourceInstance>> {
        let map = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(address).cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.resolve(address).is_some()
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn create_is_idempotent_per_address() {
        let registry = DataSourceRegistry::new();
        let context = SourceContext::new().with_address("ipt", addr(0x11));

        assert!(registry.create("TimelockedToken", addr(0x22), context.clone(), 100));
        // Deuxième création pour la même adresse: refusée, pas de double livraison
        assert!(!registry.create("TimelockedToken", addr(0x22), context, 120));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn first_writer_wins_on_context() {
        let registry = DataSourceRegistry::new();
        let first = SourceContext::new().with_string("parent", "a");
        let second = SourceContext::new().with_string("parent", "b");

        registry.create("IPToken", addr(0x33), first, 1);
        registry.create("IPToken", addr(0x33), second, 2);

        let instance = registry.resolve(&addr(0x33)).unwrap();
        assert_eq!(instance.context.string("parent"), Some("a"));
        assert_eq!(instance.created_at_block, 1);
    }

    #[test]
    fn resolve_unknown_address_is_none() {
        let registry = DataSourceRegistry::new();
        assert!(registry.resolve(&addr(0x44)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn context_round_trips_through_serde() {
        let context = SourceContext::new()
            .with_address("lockingContract", addr(0x55))
            .with_bytes("raw", &[0xde, 0xad])
            .with_uint("startBlock", 42);

        let json = serde_json::to_string(&context).unwrap();
        let back: SourceContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, context);
        assert_eq!(back.address("lockingContract"), Some(addr(0x55)));
        assert_eq!(back.uint("startBlock"), Some(42));
        assert_eq!(back.address("raw"), None);
    }
}
