//! Metrics definitions for the projection engine.
//!
//! This module defines all metrics used throughout the indexer.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "blocks_indexed_total",
        "Total number of blocks successfully indexed"
    );
    describe_counter!(
        "events_processed_total",
        "Total number of events routed to a handler"
    );
    describe_counter!(
        "events_skipped_total",
        "Total number of events dropped because no data source watches the address"
    );
    describe_counter!(
        "handler_errors_total",
        "Total number of handler errors during event processing"
    );
    describe_counter!(
        "missing_entity_total",
        "Total number of events referencing an entity that was never created"
    );
    describe_counter!(
        "integrity_violations_total",
        "Total number of detected invariant violations (terminal-state writes, conflicting links)"
    );
    describe_counter!(
        "data_sources_created_total",
        "Total number of dynamic data sources created"
    );
    describe_counter!(
        "metadata_ingested_total",
        "Total number of content-addressed metadata documents ingested"
    );
    describe_counter!(
        "metadata_errors_total",
        "Total number of metadata documents that failed to fetch or parse"
    );
    describe_counter!(
        "relay_posts_total",
        "Total number of analytics relay notifications attempted"
    );
    describe_gauge!(
        "last_indexed_block",
        "Highest block number fully projected and checkpointed"
    );
    describe_histogram!(
        "block_processing_duration_seconds",
        "Time taken to process a block in seconds"
    );
}

/// Record a successfully indexed block.
pub fn record_block_indexed(block_number: u64) {
    counter!("blocks_indexed_total").increment(1);
    gauge!("last_indexed_block").set(block_number as f64);
}

/// Record an event routed to a handler.
pub fn record_event_processed(template: &str) {
    counter!("events_processed_total", "template" => template.to_string()).increment(1);
}

/// Record an event dropped because its address is not watched.
pub fn record_event_skipped() {
    counter!("events_skipped_total").increment(1);
}

/// Record a handler error.
///
/// # Arguments
/// * `template` - The template whose handler failed
/// * `event` - The event name
pub fn record_handler_error(template: &str, event: &str) {
    counter!("handler_errors_total", "template" => template.to_string(), "event" => event.to_string())
        .increment(1);
}

/// Record an event referencing an entity that does not exist.
pub fn record_missing_entity(kind: &str) {
    counter!("missing_entity_total", "kind" => kind.to_string()).increment(1);
}

/// Record a detected invariant violation.
pub fn record_integrity_violation(kind: &str) {
    counter!("integrity_violations_total", "kind" => kind.to_string()).increment(1);
}

/// Record the creation of a dynamic data source.
pub fn record_data_source_created(template: &str) {
    counter!("data_sources_created_total", "template" => template.to_string()).increment(1);
}

/// Record a successfully ingested metadata document.
pub fn record_metadata_ingested() {
    counter!("metadata_ingested_total").increment(1);
}

/// Record a metadata document that failed to fetch or parse.
pub fn record_metadata_error() {
    counter!("metadata_errors_total").increment(1);
}

/// Record an analytics relay notification attempt.
pub fn record_relay_post(outcome: &str) {
    counter!("relay_posts_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record block processing duration.
pub fn record_block_processing_duration(duration_secs: f64) {
    histogram!("block_processing_duration_seconds").record(duration_secs);
}

/// A timer that automatically records duration when dropped.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    /// Start a new processing timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_block_processing_duration(duration);
    }
}
