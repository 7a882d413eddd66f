//! Error types for the projection engine.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Projection/handler logic errors
//! - [`StoreError`] - Entity store errors
//! - [`SourceError`] - Ledger journal errors
//! - [`ContentError`] - Content-addressed fetch errors
//! - [`IndexerError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Missing-prerequisite conditions (a referenced entity not indexed yet)
//! are NOT errors: handlers log them and return `Ok(())` so in-order
//! processing of unrelated events continues.

use thiserror::Error;

// =============================================================================
// Domain Errors
// =============================================================================

/// Projection logic errors.
///
/// Returned by handlers only for genuinely malformed input (a missing or
/// mistyped event parameter, an absent data-source context). The dispatcher
/// logs these, skips the event and carries on.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Expected event parameter was absent.
    #[error("Missing parameter `{field}` on event {event}")]
    MissingField {
        /// Event name.
        event: String,
        /// Parameter name.
        field: String,
    },

    /// Event parameter was present but not decodable as the expected type.
    #[error("Invalid parameter `{field}`: {message}")]
    InvalidField {
        /// Parameter name.
        field: String,
        /// Decode failure details.
        message: String,
    },

    /// Address failed validation.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A dynamic-template handler was invoked without its creation context.
    #[error("Missing data-source context for template {0}")]
    MissingContext(String),

    /// No handler registered for a template.
    #[error("Handler not found for template: {0}")]
    HandlerNotFound(String),

    /// Entity store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Entity store errors.
///
/// These errors originate from document persistence: queries,
/// migrations, and (de)serialization of entity documents.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// Query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Entity document (de)serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Source Errors
// =============================================================================

/// Ledger journal errors.
///
/// These errors occur while reading the decoded-event journal that feeds
/// the dispatcher.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Journal could not be opened or read.
    #[error("Journal I/O error: {0}")]
    Io(String),

    /// A journal record failed to parse.
    #[error("Journal parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Parse failure details.
        message: String,
    },

    /// Records violate canonical (block, log index) ordering.
    #[error("Journal ordering violation at line {line}: {message}")]
    OutOfOrder {
        /// 1-based line number.
        line: usize,
        /// Ordering violation details.
        message: String,
    },

    /// Journal has no header record identifying the chain.
    #[error("Journal missing header record")]
    MissingHeader,
}

// =============================================================================
// Content Errors
// =============================================================================

/// Content-addressed store fetch errors.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Content id could not be resolved to bytes.
    #[error("Content unavailable: {0}")]
    Unavailable(String),

    /// Transport-level fetch failure.
    #[error("Content fetch error: {0}")]
    Fetch(String),
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Top-level indexer orchestration errors.
///
/// This is the main error type returned by [`crate::services::IndexerService`].
/// It wraps all lower-level errors and adds indexer-specific variants.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Projection logic error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Entity store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Ledger journal error.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Journal chain doesn't match stored data.
    ///
    /// This is a fatal error that requires manual intervention (or a purged
    /// replay into an empty store).
    #[error("Chain mismatch: journal is for chain {connected} but store contains data for {expected}")]
    ChainMismatch {
        /// Chain id of the journal being read.
        connected: String,
        /// Chain id expected by the store.
        expected: String,
    },

    /// Graceful shutdown was requested.
    ///
    /// This is not really an error but uses the error type for control flow.
    #[error("Indexer shutdown requested")]
    ShutdownRequested,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for indexer operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Result type for projection operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for entity store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for ledger journal operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for content fetch operations.
pub type ContentResult<T> = Result<T, ContentError>;
