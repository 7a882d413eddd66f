//! Port trait for the content-addressed store.
//!
//! IP-NFT metadata lives off-chain behind content ids. The production
//! adapter is an IPFS HTTP gateway (`enzyme-journal`); tests inject
//! [`StaticContent`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{ContentError, ContentResult};

/// Resolver from content id to raw bytes.
///
/// One attempt per call, no retry inside the port: a failed fetch yields no
/// entity and is retried, if ever, by a later re-projection.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, cid: &str) -> ContentResult<Vec<u8>>;
}

/// Fixed cid → bytes mapping for tests.
#[derive(Default)]
pub struct StaticContent {
    documents: HashMap<String, Vec<u8>>,
}

impl StaticContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, cid: &str, bytes: &[u8]) -> Self {
        self.documents.insert(cid.to_string(), bytes.to_vec());
        self
    }
}

#[async_trait]
impl ContentSource for StaticContent {
    async fn fetch(&self, cid: &str) -> ContentResult<Vec<u8>> {
        self.documents
            .get(cid)
            .cloned()
            .ok_or_else(|| ContentError::Unavailable(cid.to_string()))
    }
}
