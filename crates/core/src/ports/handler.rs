//! Port trait for projection handlers.
//!
//! This is the main extensibility point of the engine. Each aggregate family
//! (CrowdSale, Tokenizer, IP-NFT, ...) implements [`EventHandler`] for one
//! template name; the dispatcher routes every event of a watched contract to
//! the single handler owning that contract's template.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::models::EventEnvelope;
use crate::ports::{ContentSource, EntityStore, TokenDirectory};
use crate::sources::{DataSourceRegistry, SourceContext};

/// Everything a handler may touch while projecting one event.
///
/// Handlers are pure functions of (store state, event payload, attached
/// context): all effects flow through the store and the data-source
/// registry carried here.
#[derive(Clone)]
pub struct HandlerContext {
    /// The entity store.
    pub store: Arc<dyn EntityStore>,
    /// Dynamic data-source registry (handlers create sources mid-dispatch).
    pub sources: Arc<DataSourceRegistry>,
    /// ERC-20 metadata resolver.
    pub tokens: Arc<dyn TokenDirectory>,
    /// Content-addressed store resolver (metadata ingestion).
    pub content: Arc<dyn ContentSource>,
    /// Creation context of the dynamic data source the event came from.
    /// `None` for statically configured contracts.
    pub source_context: Option<SourceContext>,
}

impl HandlerContext {
    pub fn new(
        store: Arc<dyn EntityStore>,
        sources: Arc<DataSourceRegistry>,
        tokens: Arc<dyn TokenDirectory>,
        content: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            store,
            sources,
            tokens,
            content,
            source_context: None,
        }
    }

    /// The same services with a dynamic source's context attached.
    pub fn with_source_context(&self, context: SourceContext) -> Self {
        Self {
            source_context: Some(context),
            ..self.clone()
        }
    }
}

/// Trait for template-specific projection handlers.
///
/// A handler that cannot find an expected prerequisite entity logs and
/// returns `Ok(())` — only genuinely malformed payloads return an error,
/// and the dispatcher skips those events without aborting the run.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Template name this handler owns (e.g., "CrowdSale").
    fn template(&self) -> &'static str;

    /// Project one event into entity mutations.
    async fn handle_event(&self, event: &EventEnvelope, ctx: &HandlerContext)
    -> DomainResult<()>;
}

/// Registry mapping template names to their single handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for its template. Exactly one handler owns a
    /// template; a second registration replaces the first.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(handler.template(), handler);
    }

    /// Get the handler for a template.
    pub fn get(&self, template: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(template)
    }

    pub fn has_handler(&self, template: &str) -> bool {
        self.handlers.contains_key(template)
    }

    /// All registered template names, sorted for stable logging.
    pub fn templates(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
