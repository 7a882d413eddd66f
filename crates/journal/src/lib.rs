//! Infrastructure adapters for the enzyme indexer's input side.
//!
//! Two ports from `enzyme-core` are implemented here:
//!
//! - [`JournalSource`] reads the decoded-event NDJSON journal produced by the
//!   upstream ABI decoder and delivers whole [`LedgerBlock`]s in canonical
//!   order, optionally tailing the file as records are appended.
//! - [`IpfsGateway`] resolves `ipfs://` content ids to raw bytes through an
//!   HTTP gateway for IP-NFT metadata ingestion.
//!
//! [`LedgerBlock`]: enzyme_core::models::LedgerBlock

pub mod content;
pub mod source;

pub use content::{DEFAULT_GATEWAY, DEFAULT_TIMEOUT, IpfsGateway};
pub use source::{DEFAULT_POLL_INTERVAL, JournalConfig, JournalSource};
