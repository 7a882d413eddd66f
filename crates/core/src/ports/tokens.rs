//! Port trait for ERC-20 metadata resolution.
//!
//! The original system called `decimals()`/`symbol()`/`name()` on the token
//! contract from inside handlers. Here the upstream decoder emits
//! token-directory records into the journal and handlers resolve metadata
//! through this port, so projections stay pure and replays deterministic.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::models::Address;

/// Resolved ERC-20 metadata for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub address: Address,
    pub decimals: u32,
    pub symbol: String,
    pub name: String,
}

/// Directory of known token metadata.
///
/// A miss degrades like any other missing prerequisite: logged, no entity.
pub trait TokenDirectory: Send + Sync {
    fn metadata(&self, address: &Address) -> Option<TokenRecord>;
}

/// Mutable in-memory directory; the journal adapter feeds it as token
/// records stream past, tests preload it.
#[derive(Default)]
pub struct StaticTokens {
    records: RwLock<HashMap<Address, TokenRecord>>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, record: TokenRecord) -> Self {
        self.insert(record);
        self
    }

    pub fn insert(&self, record: TokenRecord) {
        let mut map = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.insert(record.address, record);
    }

    pub fn len(&self) -> usize {
        match self.records.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenDirectory for StaticTokens {
    fn metadata(&self, address: &Address) -> Option<TokenRecord> {
        let map = match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(address).cloned()
    }
}
