//! Storage layer for the enzyme indexer.
//!
//! This crate provides PostgreSQL implementations of the storage ports
//! defined in `enzyme-core`. It handles all database interactions including
//! connection pooling, migrations, and document CRUD.
//!
//! # Architecture
//!
//! Projected entities live in a single `entities` table as JSONB documents
//! keyed by `(kind, id)`, so schema changes never require a migration. The
//! indexing checkpoint lives in `indexer_cursor`, one row per chain.
//!
//! - [`postgres::Database`] - Connection pool management
//! - [`postgres::PgEntityStore`] - `EntityStore` over the `entities` table
//! - [`postgres::PgCursorStore`] - `CursorStore` over `indexer_cursor`
//!
//! # Usage
//!
//! ```ignore
//! use enzyme_storage::{Database, DatabaseConfig, PgCursorStore, PgEntityStore};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_indexer(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Run migrations
//! db.migrate().await?;
//!
//! // Create the stores
//! let store = Arc::new(PgEntityStore::new(&db));
//! let cursors = Arc::new(PgCursorStore::new(&db));
//! ```

pub mod postgres;

pub use postgres::{Database, DatabaseConfig, PgCursorStore, PgEntityStore, PurgeStats};
