//! NDJSON ledger journal adapter implementing the `EventSource` port.
//!
//! The upstream ABI decoder appends one JSON record per line:
//!
//! - a `header` record carrying the chain id (first record of the file),
//! - `token` records announcing ERC-20 metadata as contracts are touched,
//! - `event` records in canonical (block number, log index) order.
//!
//! Events are batched per block before delivery so the dispatcher always
//! checkpoints whole blocks. Token records feed the shared [`StaticTokens`]
//! directory as they stream past, including while skipping blocks below the
//! resume point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, instrument};

use enzyme_core::error::{SourceError, SourceResult};
use enzyme_core::models::{EventEnvelope, LedgerBlock};
use enzyme_core::ports::{BlockStream, EventSource, StaticTokens, TokenRecord};

/// Default delay between tail polls in follow mode.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the journal reader.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Path to the NDJSON journal file.
    pub path: PathBuf,
    /// Keep polling for appended records instead of ending at the tail.
    pub follow: bool,
    /// Delay between polls when `follow` is set.
    pub poll_interval: Duration,
}

impl JournalConfig {
    /// Read the journal once and end the stream at the tail.
    pub fn finite(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            follow: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Tail the journal, polling for appended records.
    pub fn following(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            follow: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// =============================================================================
// Record Format
// =============================================================================

/// One journal line, tagged by `kind`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum JournalRecord {
    #[serde(rename_all = "camelCase")]
    Header { chain_id: String },
    Token(TokenRecord),
    Event(EventEnvelope),
}

// =============================================================================
// Journal Source
// =============================================================================

/// NDJSON journal adapter implementing [`EventSource`].
pub struct JournalSource {
    config: JournalConfig,
    tokens: Arc<StaticTokens>,
}

impl JournalSource {
    /// Create a journal source over a shared token directory.
    ///
    /// The directory is shared with the handlers so token records become
    /// visible to projections the moment they are read.
    pub fn new(config: JournalConfig, tokens: Arc<StaticTokens>) -> Self {
        Self { config, tokens }
    }

    async fn open(&self) -> SourceResult<Lines<BufReader<File>>> {
        let file = File::open(&self.config.path)
            .await
            .map_err(|e| SourceError::Io(format!("{}: {e}", self.config.path.display())))?;
        Ok(BufReader::new(file).lines())
    }
}

#[async_trait]
impl EventSource for JournalSource {
    async fn chain_id(&self) -> SourceResult<String> {
        let mut lines = self.open().await?;
        let mut line_no = 0usize;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| SourceError::Io(e.to_string()))?
        {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: JournalRecord = serde_json::from_str(line.trim()).map_err(|e| {
                SourceError::Parse {
                    line: line_no,
                    message: e.to_string(),
                }
            })?;
            return match record {
                JournalRecord::Header { chain_id } => Ok(chain_id),
                _ => Err(SourceError::MissingHeader),
            };
        }

        Err(SourceError::MissingHeader)
    }

    #[instrument(skip_all, fields(path = %self.config.path.display(), from_block))]
    async fn stream_from(&self, from_block: u64) -> SourceResult<BlockStream> {
        debug!(follow = self.config.follow, "Opening journal");

        let state = ReaderState {
            lines: self.open().await?,
            line_no: 0,
            from_block,
            follow: self.config.follow,
            poll_interval: self.config.poll_interval,
            tokens: Arc::clone(&self.tokens),
            pending: None,
            flushed: None,
            failed: false,
        };

        Ok(Box::pin(futures::stream::unfold(state, advance)))
    }
}

// =============================================================================
// Reader State Machine
// =============================================================================

struct ReaderState {
    lines: Lines<BufReader<File>>,
    line_no: usize,
    from_block: u64,
    follow: bool,
    poll_interval: Duration,
    tokens: Arc<StaticTokens>,
    /// Block currently being assembled.
    pending: Option<LedgerBlock>,
    /// Highest block number already delivered or dropped.
    flushed: Option<u64>,
    failed: bool,
}

impl ReaderState {
    fn fail(&mut self, error: SourceError) -> Option<SourceResult<LedgerBlock>> {
        self.failed = true;
        Some(Err(error))
    }

    /// Validate ordering and fold one event into the pending block.
    ///
    /// Returns a completed block when the event opens a new one.
    fn accept(&mut self, event: EventEnvelope) -> Option<SourceResult<LedgerBlock>> {
        if let Some(flushed) = self.flushed {
            if event.block_number <= flushed {
                return self.fail(SourceError::OutOfOrder {
                    line: self.line_no,
                    message: format!(
                        "block {} after delivered block {flushed}",
                        event.block_number
                    ),
                });
            }
        }

        let pending_number = self.pending.as_ref().map(|b| b.number);
        match pending_number {
            Some(number) if event.block_number == number => {
                let last_index = self.pending.as_ref().and_then(|b| b.events.last()).map(|e| e.log_index);
                if let Some(last) = last_index {
                    if event.log_index <= last {
                        let message = format!(
                            "log index {} after {} in block {number}",
                            event.log_index, last
                        );
                        return self.fail(SourceError::OutOfOrder {
                            line: self.line_no,
                            message,
                        });
                    }
                }
                if let Some(block) = self.pending.as_mut() {
                    block.events.push(event);
                }
                None
            }
            Some(number) if event.block_number > number => {
                let done = self.open_block(event);
                self.deliver(done)
            }
            Some(number) => {
                let message = format!("block {} after block {number}", event.block_number);
                self.fail(SourceError::OutOfOrder {
                    line: self.line_no,
                    message,
                })
            }
            None => {
                self.open_block(event);
                None
            }
        }
    }

    /// Start assembling the event's block, returning the previous one.
    fn open_block(&mut self, event: EventEnvelope) -> Option<LedgerBlock> {
        self.pending.replace(LedgerBlock {
            number: event.block_number,
            timestamp: event.block_timestamp,
            events: vec![event],
        })
    }

    /// Emit a completed block, or drop it silently below the resume point.
    fn deliver(&mut self, block: Option<LedgerBlock>) -> Option<SourceResult<LedgerBlock>> {
        let block = block?;
        self.flushed = Some(block.number);
        if block.number >= self.from_block {
            Some(Ok(block))
        } else {
            None
        }
    }
}

/// Drive the reader until it produces the next block, an error, or the end.
async fn advance(mut state: ReaderState) -> Option<(SourceResult<LedgerBlock>, ReaderState)> {
    if state.failed {
        return None;
    }

    loop {
        let line = match state.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                let item = state.fail(SourceError::Io(e.to_string()));
                return item.map(|item| (item, state));
            }
        };

        let Some(line) = line else {
            if state.follow {
                // The writer appends whole blocks, so the tail block is held
                // until its successor confirms it is complete.
                tokio::time::sleep(state.poll_interval).await;
                continue;
            }
            let done = state.pending.take();
            match state.deliver(done) {
                Some(item) => return Some((item, state)),
                None => return None,
            }
        };

        state.line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: JournalRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                let error = SourceError::Parse {
                    line: state.line_no,
                    message: e.to_string(),
                };
                let item = state.fail(error);
                return item.map(|item| (item, state));
            }
        };

        match record {
            JournalRecord::Header { .. } => continue,
            JournalRecord::Token(token) => {
                state.tokens.insert(token);
                continue;
            }
            JournalRecord::Event(event) => {
                if let Some(item) = state.accept(event) {
                    return Some((item, state));
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::StreamExt;
    use serde_json::json;

    use enzyme_core::models::Address;
    use enzyme_core::ports::TokenDirectory;

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn journal_path() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("enzyme-journal-{}-{n}.ndjson", std::process::id()))
    }

    fn write_lines(path: &Path, lines: &[String]) {
        std::fs::write(path, format!("{}\n", lines.join("\n"))).unwrap();
    }

    fn append_lines(path: &Path, lines: &[String]) {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        writeln!(file, "{}", lines.join("\n")).unwrap();
    }

    fn header() -> String {
        json!({"kind": "header", "chainId": "11155111"}).to_string()
    }

    fn token(byte: u8) -> String {
        json!({
            "kind": "token",
            "address": addr_hex(byte),
            "decimals": 18,
            "symbol": "MOL",
            "name": "Molecules",
        })
        .to_string()
    }

    fn addr_hex(byte: u8) -> String {
        Address([byte; 20]).to_hex()
    }

    fn event(block: u64, log_index: u32, name: &str) -> String {
        json!({
            "kind": "event",
            "address": addr_hex(0xaa),
            "event": name,
            "params": {},
            "block_number": block,
            "block_timestamp": 1_700_000_000u64 + block,
            "tx_hash": format!("0x{}", "42".repeat(32)),
            "log_index": log_index,
            "tx_log_index": log_index,
        })
        .to_string()
    }

    async fn collect(source: &JournalSource, from_block: u64) -> Vec<SourceResult<LedgerBlock>> {
        let stream = source.stream_from(from_block).await.unwrap();
        stream.collect().await
    }

    fn source_at(path: &Path) -> (JournalSource, Arc<StaticTokens>) {
        let tokens = Arc::new(StaticTokens::new());
        let source = JournalSource::new(JournalConfig::finite(path), Arc::clone(&tokens));
        (source, tokens)
    }

    #[tokio::test]
    async fn reads_chain_id_from_header() {
        let path = journal_path();
        write_lines(&path, &[header(), event(1, 0, "Bid")]);

        let (source, _) = source_at(&path);
        assert_eq!(source.chain_id().await.unwrap(), "11155111");
    }

    #[tokio::test]
    async fn missing_header_is_an_error() {
        let path = journal_path();
        write_lines(&path, &[event(1, 0, "Bid")]);

        let (source, _) = source_at(&path);
        assert!(matches!(
            source.chain_id().await,
            Err(SourceError::MissingHeader)
        ));
    }

    #[tokio::test]
    async fn batches_events_per_block_and_feeds_token_directory() {
        let path = journal_path();
        write_lines(
            &path,
            &[
                header(),
                token(0xf0),
                event(100, 0, "Started"),
                event(100, 1, "Bid"),
                event(102, 0, "Settled"),
            ],
        );

        let (source, tokens) = source_at(&path);
        let blocks: Vec<_> = collect(&source, 0)
            .await
            .into_iter()
            .map(|b| b.unwrap())
            .collect();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].number, 100);
        assert_eq!(blocks[0].events.len(), 2);
        assert_eq!(blocks[1].number, 102);
        assert_eq!(blocks[1].events[0].event, "Settled");

        let record = tokens.metadata(&Address([0xf0; 20])).unwrap();
        assert_eq!(record.symbol, "MOL");
    }

    #[tokio::test]
    async fn resume_point_skips_earlier_blocks_but_keeps_tokens() {
        let path = journal_path();
        write_lines(
            &path,
            &[
                header(),
                token(0xf0),
                event(100, 0, "Started"),
                event(101, 0, "Bid"),
                event(102, 0, "Settled"),
            ],
        );

        let (source, tokens) = source_at(&path);
        let blocks: Vec<_> = collect(&source, 102)
            .await
            .into_iter()
            .map(|b| b.unwrap())
            .collect();

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].number, 102);
        // Token records before the resume point still reach the directory.
        assert!(tokens.metadata(&Address([0xf0; 20])).is_some());
    }

    // Test critique: une régression d'index de log doit arrêter le flux avec
    // une erreur d'ordre, jamais livrer un bloc corrompu.
    #[tokio::test]
    async fn ordering_violation_ends_the_stream() {
        let path = journal_path();
        write_lines(
            &path,
            &[header(), event(100, 1, "Bid"), event(100, 0, "Bid")],
        );

        let (source, _) = source_at(&path);
        let items = collect(&source, 0).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Err(SourceError::OutOfOrder { line: 3, .. })
        ));
    }

    #[tokio::test]
    async fn malformed_record_reports_its_line() {
        let path = journal_path();
        write_lines(&path, &[header(), "{not json".to_string()]);

        let (source, _) = source_at(&path);
        let items = collect(&source, 0).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SourceError::Parse { line: 2, .. })));
    }

    #[tokio::test]
    async fn follow_mode_holds_the_tail_block_until_its_successor() {
        let path = journal_path();
        write_lines(&path, &[header(), event(100, 0, "Started"), event(101, 0, "Bid")]);

        let tokens = Arc::new(StaticTokens::new());
        let mut config = JournalConfig::following(&path);
        config.poll_interval = Duration::from_millis(10);
        let source = JournalSource::new(config, tokens);

        let mut stream = source.stream_from(0).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.number, 100);

        // Block 101 is the tail: it must not surface yet.
        let pending = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(pending.is_err());

        append_lines(&path, &[event(102, 0, "Settled")]);
        let second = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.number, 101);
    }
}
