//! Read-only GraphQL API over the enzyme entity store.
//!
//! Exposes every projected entity by id, id-ordered `first`/`skip` lists,
//! and relationship traversal (a sale's contributions, a claim token's
//! holder balances, a vesting contract's schedules). Amounts surface as
//! decimal strings, addresses as 0x-prefixed hex.
//!
//! ```ignore
//! let schema = build_schema(store, cursors);
//! serve_with_shutdown(schema, ServerConfig::default(), shutdown).await?;
//! ```

mod schema;
mod server;
mod types;

pub use schema::{IndexerStatus, MAX_QUERY_COMPLEXITY, MAX_QUERY_DEPTH, QueryRoot, build_schema};
pub use server::{ServerConfig, serve, serve_with_shutdown};
pub use types::EnzymeSchema;
