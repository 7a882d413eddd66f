//! Port trait for the decoded-event ledger.
//!
//! The dispatcher consumes whole blocks in canonical order. Implementations
//! live in the infrastructure layer (`enzyme-journal`); tests inject scripted
//! streams.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::SourceResult;
use crate::models::LedgerBlock;

/// Stream of ledger blocks in ascending block-number order.
pub type BlockStream = Pin<Box<dyn Stream<Item = SourceResult<LedgerBlock>> + Send>>;

/// Port trait for the event source.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Chain the ledger belongs to (e.g., "11155111").
    async fn chain_id(&self) -> SourceResult<String>;

    /// Stream blocks with number >= `from_block`, canonical order.
    ///
    /// The stream ends at the journal tail, or keeps yielding as records
    /// are appended when the source runs in follow mode.
    async fn stream_from(&self, from_block: u64) -> SourceResult<BlockStream>;
}
