//! PostgreSQL storage adapter.
//!
//! This module implements the storage ports defined in `enzyme-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgEntityStore`] - JSONB document store keyed by `(kind, id)`
//! - [`PgCursorStore`] - Indexing checkpoint per chain
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_indexer(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let store = Arc::new(PgEntityStore::new(&db));
//! let cursors = Arc::new(PgCursorStore::new(&db));
//! ```

mod cursor_store;
mod database;
mod entity_store;

pub use cursor_store::PgCursorStore;
pub use database::{Database, DatabaseConfig, PurgeStats};
pub use entity_store::PgEntityStore;
