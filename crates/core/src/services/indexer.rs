//! Core indexer service - orchestrates block projection.
//!
//! The service drains an [`EventSource`] in canonical order and routes each
//! event to the handler owning the contract's template. Dispatch is
//! single-threaded by construction: one event fully projected before the
//! next begins, so replaying the same ledger always yields the same store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::entities::{DataSourceRecord, EntityKind};
use crate::error::{IndexerError, IndexerResult};
use crate::metrics::{
    ProcessingTimer, record_block_indexed, record_event_processed, record_event_skipped,
    record_handler_error,
};
use crate::models::{Address, EventEnvelope, IndexerCursor, LedgerBlock, Manifest, StaticSource};
use crate::ports::{CursorStore, EventSource, HandlerContext, HandlerRegistry};

// =============================================================================
// IndexerService
// =============================================================================

/// Main projection service.
///
/// # Flow
///
/// 1. Verify the source's chain id against the manifest and any stored cursor
/// 2. Restore dynamic data sources persisted by earlier runs
/// 3. Resume from the cursor (or the earliest static start block)
/// 4. For each block, dispatch events in (block, log index) order
/// 5. Checkpoint the cursor after each fully projected block
pub struct IndexerService {
    manifest: Manifest,
    source: Arc<dyn EventSource>,
    cursors: Arc<dyn CursorStore>,
    handlers: Arc<HandlerRegistry>,
    ctx: HandlerContext,
    /// Statically configured contracts by address.
    statics: HashMap<Address, StaticSource>,
}

impl IndexerService {
    pub fn new(
        manifest: Manifest,
        source: Arc<dyn EventSource>,
        cursors: Arc<dyn CursorStore>,
        handlers: Arc<HandlerRegistry>,
        ctx: HandlerContext,
    ) -> Self {
        let statics = manifest
            .sources
            .iter()
            .map(|s| (s.address, s.clone()))
            .collect();
        Self {
            manifest,
            source,
            cursors,
            handlers,
            ctx,
            statics,
        }
    }

    /// Start the indexer.
    ///
    /// Returns `Ok(())` once the source is drained (one-shot replay), or
    /// [`IndexerError::ShutdownRequested`] when the shutdown signal fires.
    #[instrument(skip_all, fields(chain = %self.manifest.chain_id))]
    pub async fn run(
        &self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> IndexerResult<()> {
        info!("⛓️  Starting indexer");

        self.verify_chain_id().await?;
        self.restore_data_sources().await?;

        let mut next_block = self.resume_point().await?;
        debug!(from_block = next_block, "Resume point determined");

        // Exponential backoff configuration
        const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
        const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
        let mut retry_delay = INITIAL_RETRY_DELAY;

        loop {
            if *shutdown_rx.borrow() {
                debug!("Shutdown requested");
                return Err(IndexerError::ShutdownRequested);
            }

            match self.source.stream_from(next_block).await {
                Ok(mut stream) => {
                    debug!("📡 Event stream established");
                    retry_delay = INITIAL_RETRY_DELAY; // Reset backoff on success

                    // Exits only by returning (drained, shutdown, fatal) or by
                    // breaking out to the reconnect path on a stream error.
                    loop {
                        let item = tokio::select! {
                            item = stream.next() => item,
                            _ = shutdown_rx.changed() => {
                                if *shutdown_rx.borrow() {
                                    debug!("Shutdown requested");
                                    return Err(IndexerError::ShutdownRequested);
                                }
                                continue;
                            }
                        };

                        match item {
                            Some(Ok(block)) => {
                                let block_number = block.number;
                                match self.process_block(block).await {
                                    Ok(true) => {
                                        info!(block = block_number, "⛓️  Block indexed");
                                        next_block = block_number + 1;
                                    }
                                    Ok(false) => {
                                        trace!(
                                            block = block_number,
                                            "Block skipped (already indexed)"
                                        );
                                    }
                                    Err(e) => {
                                        error!(block = block_number, error = ?e, "❌ Block processing failed");
                                        return Err(e);
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                warn!(error = ?e, "⚠️  Stream error, reconnecting...");
                                break;
                            }
                            None => {
                                info!("✅ Event source drained");
                                return Ok(());
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        error = ?e,
                        retry_in_ms = retry_delay.as_millis(),
                        "⚠️  Failed to open event stream, retrying..."
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(retry_delay) => {
                    debug!(retry_delay_ms = retry_delay.as_millis(), "🔄 Reconnecting to source...");
                    // Exponential backoff: double the delay, up to max
                    retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return Err(IndexerError::ShutdownRequested);
                    }
                }
            }
        }
    }

    /// Verify the connected source matches the manifest and any existing
    /// indexed data. Returns an error if the store contains data from a
    /// different chain.
    async fn verify_chain_id(&self) -> IndexerResult<()> {
        let connected = self.source.chain_id().await?;

        if connected != self.manifest.chain_id {
            error!(
                connected = %connected,
                expected = %self.manifest.chain_id,
                "❌ Chain mismatch! Source serves a different chain than the manifest"
            );
            return Err(IndexerError::ChainMismatch {
                connected,
                expected: self.manifest.chain_id.clone(),
            });
        }

        if let Some(cursor) = self.cursors.get_any_cursor().await? {
            if cursor.chain_id != connected {
                error!(
                    connected = %connected,
                    expected = %cursor.chain_id,
                    "❌ Chain mismatch! Store contains data from a different chain"
                );
                error!(
                    "   Manual action required: either connect to the correct chain or purge the store"
                );
                return Err(IndexerError::ChainMismatch {
                    connected,
                    expected: cursor.chain_id,
                });
            }
            debug!("Chain ID verified");
        }

        Ok(())
    }

    /// Re-register dynamic data sources persisted by earlier runs.
    #[instrument(skip(self))]
    async fn restore_data_sources(&self) -> IndexerResult<()> {
        const PAGE: u32 = 500;
        let mut skip = 0u32;
        let mut restored = 0usize;

        loop {
            let page = self
                .ctx
                .store
                .list(EntityKind::DataSource, PAGE, skip)
                .await?;
            let page_len = page.len();

            for doc in page {
                match serde_json::from_value::<DataSourceRecord>(doc) {
                    Ok(record) => {
                        self.ctx.sources.restore(&record);
                        restored += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "⚠️  Skipping malformed data source record");
                    }
                }
            }

            if page_len < PAGE as usize {
                break;
            }
            skip += PAGE;
        }

        if restored > 0 {
            info!(count = restored, "🗄️  Dynamic data sources restored");
        }
        Ok(())
    }

    /// First block to request from the source.
    async fn resume_point(&self) -> IndexerResult<u64> {
        if let Some(cursor) = self.cursors.get_cursor(&self.manifest.chain_id).await? {
            debug!(
                block = cursor.last_indexed_block,
                "Cursor found, resuming after it"
            );
            return Ok(cursor.last_indexed_block + 1);
        }

        debug!("No cursor found, starting from earliest static source");
        Ok(self
            .manifest
            .sources
            .iter()
            .map(|s| s.start_block)
            .min()
            .unwrap_or(0))
    }

    /// Project a single block.
    /// Returns `Ok(true)` if processed, `Ok(false)` if skipped.
    #[instrument(skip(self, block), fields(block = block.number))]
    async fn process_block(&self, block: LedgerBlock) -> IndexerResult<bool> {
        trace!(events = block.events.len(), "Processing block");

        // Skip already indexed blocks (happens on reconnect)
        if let Some(cursor) = self.cursors.get_cursor(&self.manifest.chain_id).await?
            && block.number <= cursor.last_indexed_block
        {
            return Ok(false);
        }

        let _timer = ProcessingTimer::new();

        for event in &block.events {
            self.dispatch_event(event, block.number).await;
        }

        let cursor = IndexerCursor {
            chain_id: self.manifest.chain_id.clone(),
            last_indexed_block: block.number,
            updated_at: chrono::Utc::now(),
        };
        self.cursors.set_cursor(&cursor).await?;

        record_block_indexed(block.number);
        trace!("Block processed successfully");
        Ok(true)
    }

    /// Route one event to the handler owning its contract's template.
    ///
    /// Handler failures are logged and counted but never abort the run:
    /// a malformed payload must not wedge the projection.
    async fn dispatch_event(&self, event: &EventEnvelope, block_number: u64) {
        let (template, ctx) = match self.ctx.sources.resolve(&event.address) {
            Some(instance) => (
                instance.template.clone(),
                self.ctx.with_source_context(instance.context.clone()),
            ),
            None => match self.statics.get(&event.address) {
                Some(source) if block_number >= source.start_block => {
                    (source.template.clone(), self.ctx.clone())
                }
                Some(_) => {
                    trace!(
                        address = %event.address,
                        event = %event.event,
                        "Event before static source start block, skipping"
                    );
                    record_event_skipped();
                    return;
                }
                None => {
                    trace!(
                        address = %event.address,
                        event = %event.event,
                        "No data source watches this address, skipping"
                    );
                    record_event_skipped();
                    return;
                }
            },
        };

        let Some(handler) = self.handlers.get(&template) else {
            warn!(template = %template, event = %event.event, "⚠️  No handler for template");
            record_event_skipped();
            return;
        };

        match handler.handle_event(event, &ctx).await {
            Ok(()) => record_event_processed(&template),
            Err(e) => {
                warn!(
                    id = %event.id(),
                    template = %template,
                    event = %event.event,
                    error = %e,
                    "⚠️  Handler failed for event"
                );
                record_handler_error(&template, &event.event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainResult, SourceError, SourceResult};
    use crate::models::TxHash;
    use crate::ports::{
        BlockStream, EntityStore, EventHandler, StaticContent, StaticTokens,
    };
    use crate::sources::DataSourceRegistry;
    use crate::store::{MemoryCursor, MemoryStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedSource {
        chain_id: String,
        blocks: Vec<LedgerBlock>,
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn chain_id(&self) -> SourceResult<String> {
            Ok(self.chain_id.clone())
        }

        async fn stream_from(&self, from_block: u64) -> SourceResult<BlockStream> {
            let blocks: Vec<_> = self
                .blocks
                .iter()
                .filter(|b| b.number >= from_block)
                .cloned()
                .map(Ok)
                .collect();
            Ok(Box::pin(futures::stream::iter(blocks)))
        }
    }

    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        fn template(&self) -> &'static str {
            "CrowdSale"
        }

        async fn handle_event(
            &self,
            event: &EventEnvelope,
            _ctx: &HandlerContext,
        ) -> DomainResult<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", event.id(), event.event));
            Ok(())
        }
    }

    fn envelope(address: Address, block: u64, log_index: u32, name: &str) -> EventEnvelope {
        EventEnvelope {
            address,
            event: name.to_string(),
            params: serde_json::json!({}),
            block_number: block,
            block_timestamp: 1_700_000_000 + block,
            tx_hash: TxHash([0x11; 32]),
            log_index,
            tx_log_index: log_index,
        }
    }

    fn service_for(
        blocks: Vec<LedgerBlock>,
        statics: Vec<StaticSource>,
    ) -> (IndexerService, Arc<MemoryStore>, Arc<RecordingHandler>, Arc<MemoryCursor>) {
        let store = Arc::new(MemoryStore::new());
        let cursors = Arc::new(MemoryCursor::new());
        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
        });
        let mut registry = HandlerRegistry::new();
        registry.register(handler.clone());

        let ctx = HandlerContext::new(
            store.clone() as Arc<dyn EntityStore>,
            Arc::new(DataSourceRegistry::new()),
            Arc::new(StaticTokens::new()),
            Arc::new(StaticContent::new()),
        );

        let service = IndexerService::new(
            Manifest {
                chain_id: "11155111".to_string(),
                sources: statics,
            },
            Arc::new(ScriptedSource {
                chain_id: "11155111".to_string(),
                blocks,
            }),
            cursors.clone(),
            Arc::new(registry),
            ctx,
        );
        (service, store, handler, cursors)
    }

    fn sale_contract() -> Address {
        Address([0xaa; 20])
    }

    fn static_sale_source(start_block: u64) -> StaticSource {
        StaticSource {
            template: "CrowdSale".to_string(),
            address: sale_contract(),
            start_block,
        }
    }

    #[tokio::test]
    async fn drains_source_and_checkpoints_cursor() {
        let blocks = vec![
            LedgerBlock {
                number: 100,
                timestamp: 1_700_000_100,
                events: vec![
                    envelope(sale_contract(), 100, 0, "Started"),
                    envelope(sale_contract(), 100, 1, "Bid"),
                ],
            },
            LedgerBlock {
                number: 101,
                timestamp: 1_700_000_101,
                events: vec![envelope(sale_contract(), 101, 0, "Settled")],
            },
        ];
        let (service, _store, handler, cursors) =
            service_for(blocks, vec![static_sale_source(0)]);

        let (_tx, rx) = tokio::sync::watch::channel(false);
        service.run(rx).await.unwrap();

        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec!["100-0:Started", "100-1:Bid", "101-0:Settled"]
        );
        let cursor = cursors.get_cursor("11155111").await.unwrap().unwrap();
        assert_eq!(cursor.last_indexed_block, 101);
    }

    // Test critique: les événements d'adresses non surveillées ou antérieurs
    // au start block ne doivent jamais atteindre un handler.
    #[tokio::test]
    async fn skips_unwatched_and_pre_start_events() {
        let stranger = Address([0xbb; 20]);
        let blocks = vec![LedgerBlock {
            number: 50,
            timestamp: 1_700_000_050,
            events: vec![
                envelope(stranger, 50, 0, "Started"),
                envelope(sale_contract(), 50, 1, "Started"),
            ],
        }];
        let (service, _store, handler, _cursors) =
            service_for(blocks, vec![static_sale_source(60)]);

        let (_tx, rx) = tokio::sync::watch::channel(false);
        service.run(rx).await.unwrap();

        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resumes_after_existing_cursor() {
        let blocks = vec![
            LedgerBlock {
                number: 10,
                timestamp: 1_700_000_010,
                events: vec![envelope(sale_contract(), 10, 0, "Started")],
            },
            LedgerBlock {
                number: 11,
                timestamp: 1_700_000_011,
                events: vec![envelope(sale_contract(), 11, 0, "Bid")],
            },
        ];
        let (service, _store, handler, cursors) =
            service_for(blocks, vec![static_sale_source(0)]);

        cursors
            .set_cursor(&IndexerCursor {
                chain_id: "11155111".to_string(),
                last_indexed_block: 10,
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let (_tx, rx) = tokio::sync::watch::channel(false);
        service.run(rx).await.unwrap();

        assert_eq!(*handler.seen.lock().unwrap(), vec!["11-0:Bid"]);
    }

    struct FlakySource {
        blocks: Vec<LedgerBlock>,
        attempts: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EventSource for FlakySource {
        async fn chain_id(&self) -> SourceResult<String> {
            Ok("11155111".to_string())
        }

        async fn stream_from(&self, from_block: u64) -> SourceResult<BlockStream> {
            let attempt = self
                .attempts
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut items: Vec<SourceResult<LedgerBlock>> = self
                .blocks
                .iter()
                .filter(|b| b.number >= from_block)
                .cloned()
                .map(Ok)
                .collect();
            if attempt == 0 {
                // First connection dies after one block.
                items.truncate(1);
                items.push(Err(SourceError::Io("connection reset".to_string())));
            }
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    // Test critique: une erreur de flux doit déclencher une reconnexion qui
    // reprend après le dernier bloc indexé, sans redoubler les événements.
    #[tokio::test]
    async fn reconnects_after_stream_error_without_duplicates() {
        let blocks = vec![
            LedgerBlock {
                number: 100,
                timestamp: 1_700_000_100,
                events: vec![envelope(sale_contract(), 100, 0, "Started")],
            },
            LedgerBlock {
                number: 101,
                timestamp: 1_700_000_101,
                events: vec![envelope(sale_contract(), 101, 0, "Bid")],
            },
        ];
        let store = Arc::new(MemoryStore::new());
        let cursors = Arc::new(MemoryCursor::new());
        let handler = Arc::new(RecordingHandler {
            seen: Mutex::new(Vec::new()),
        });
        let mut registry = HandlerRegistry::new();
        registry.register(handler.clone());
        let ctx = HandlerContext::new(
            store.clone() as Arc<dyn EntityStore>,
            Arc::new(DataSourceRegistry::new()),
            Arc::new(StaticTokens::new()),
            Arc::new(StaticContent::new()),
        );
        let service = IndexerService::new(
            Manifest {
                chain_id: "11155111".to_string(),
                sources: vec![static_sale_source(0)],
            },
            Arc::new(FlakySource {
                blocks,
                attempts: std::sync::atomic::AtomicUsize::new(0),
            }),
            cursors.clone(),
            Arc::new(registry),
            ctx,
        );

        let (_tx, rx) = tokio::sync::watch::channel(false);
        service.run(rx).await.unwrap();

        assert_eq!(
            *handler.seen.lock().unwrap(),
            vec!["100-0:Started", "101-0:Bid"]
        );
        let cursor = cursors.get_cursor("11155111").await.unwrap().unwrap();
        assert_eq!(cursor.last_indexed_block, 101);
    }

    #[tokio::test]
    async fn rejects_chain_mismatch_against_stored_cursor() {
        let (service, _store, _handler, cursors) =
            service_for(Vec::new(), vec![static_sale_source(0)]);

        cursors
            .set_cursor(&IndexerCursor {
                chain_id: "1".to_string(),
                last_indexed_block: 5,
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let (_tx, rx) = tokio::sync::watch::channel(false);
        let err = service.run(rx).await.unwrap_err();
        assert!(matches!(err, IndexerError::ChainMismatch { .. }));
    }
}
