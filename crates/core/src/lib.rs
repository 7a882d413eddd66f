//! Core domain layer for the Enzyme projection engine.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! business logic services for the event-sourced contract indexer. It follows
//! hexagonal architecture principles - this is the innermost layer with
//! no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     enzyme (binary)                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  enzyme-graphql   │  enzyme-handlers   │   enzyme-journal   │
//! │     (API)         │   (projections)    │  (ledger + IPFS)   │
//! ├───────────────────┴────────────────────┴────────────────────┤
//! │                    enzyme-storage                           │
//! │                     (PostgreSQL)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     enzyme-core  ← YOU ARE HERE             │
//! │          (models, entities, ports, services)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Wire-level models (EventEnvelope, LedgerBlock, Amount, etc.)
//! - [`entities`] - Projected domain entities (CrowdSale, Ipnft, Listing, ...)
//! - [`ports`] - Interface traits for adapters to implement
//! - [`sources`] - Dynamic data-source registry and creation contexts
//! - [`services`] - Core business logic (IndexerService)
//! - [`store`] - In-memory EntityStore for tests and dry runs
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! Ports define interfaces that external adapters must implement:
//!
//! - [`ports::EventSource`] - Stream canonical-ordered blocks of contract events
//! - [`ports::EntityStore`] - Persist and query projected entities
//! - [`ports::EventHandler`] - Project one contract template's events
//! - [`ports::ContentSource`] - Resolve content-addressed metadata documents
//! - [`ports::TokenDirectory`] - Resolve ERC-20 token metadata
//!
//! ## Handler System
//!
//! The indexer uses a handler-based extensibility model. Each contract
//! template that needs projection logic implements [`ports::EventHandler`].
//! Handlers are registered in a [`ports::HandlerRegistry`] and called for
//! every event of a watched address, one event at a time, in canonical
//! (block, log index) order.
//!
//! ## Indexer Lifecycle
//!
//! 1. Verify the source's chain id against manifest and stored cursor
//! 2. Restore dynamic data sources persisted by earlier runs
//! 3. Stream blocks from the cursor (or the earliest static start block)
//! 4. Route each event to the handler owning its contract's template
//! 5. Checkpoint the cursor after each fully projected block

pub mod entities;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
pub mod sources;
pub mod store;
