//! GraphQL schema definition.
//!
//! One query root over the entity store: per-entity lookup by id, id-ordered
//! pagination, and the relationship traversals defined on the object types.

use std::sync::Arc;

use async_graphql::{Context, EmptyMutation, EmptySubscription, Object, Result, Schema};

use enzyme_core::entities as core;
use enzyme_core::entities::Entity;
use enzyme_core::ports::{CursorStore, EntityStore, EntityStoreExt};

use crate::types::{
    Contribution, CrowdSale, EnzymeSchema, Fraction, Fractionalized, Ipnft, IpnftMetadata,
    Listing, LockedSchedule, Mintpass, Reservation, TimelockedToken, Token,
};

// -----------------------------------------------------------------------------
// Schema Configuration
// -----------------------------------------------------------------------------

/// Maximum query depth to prevent deeply nested queries (DoS protection).
/// Note: GraphQL introspection requires depth ~13, so we use 15 to allow it.
pub const MAX_QUERY_DEPTH: usize = 15;

/// Maximum query complexity score (DoS protection).
/// Each field has a default complexity of 1, nested objects multiply.
pub const MAX_QUERY_COMPLEXITY: usize = 500;

/// Maximum page size for pagination.
const MAX_PAGE_SIZE: i32 = 100;
/// Default page size for pagination.
const DEFAULT_PAGE_SIZE: i32 = 20;
/// Maximum length for id arguments.
const MAX_ID_LENGTH: usize = 256;

// -----------------------------------------------------------------------------
// Schema Builder
// -----------------------------------------------------------------------------

/// Build the schema over the entity and cursor stores.
///
/// Includes query depth and complexity limits for DoS protection.
pub fn build_schema(store: Arc<dyn EntityStore>, cursors: Arc<dyn CursorStore>) -> EnzymeSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(store)
        .data(cursors)
        .limit_depth(MAX_QUERY_DEPTH)
        .limit_complexity(MAX_QUERY_COMPLEXITY)
        .finish()
}

// -----------------------------------------------------------------------------
// Query Root
// -----------------------------------------------------------------------------

/// Read-only query root over the projected entities.
#[derive(Default)]
pub struct QueryRoot;

/// Load one entity by id and convert it to its GraphQL mirror.
async fn one<C, G>(ctx: &Context<'_>, id: &str) -> Result<Option<G>>
where
    C: Entity,
    G: From<C>,
{
    validate_id(id)?;
    let store = ctx.data::<Arc<dyn EntityStore>>()?;
    Ok(store.load::<C>(id).await?.map(G::from))
}

/// Id-ordered page of one entity kind, converted to GraphQL mirrors.
async fn many<C, G>(ctx: &Context<'_>, first: Option<i32>, skip: Option<i32>) -> Result<Vec<G>>
where
    C: Entity,
    G: From<C>,
{
    let store = ctx.data::<Arc<dyn EntityStore>>()?;
    let docs = store.list(C::KIND, page_first(first), page_skip(skip)).await?;
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let entity: C = serde_json::from_value(doc)
            .map_err(|e| async_graphql::Error::new(format!("Corrupt {} document: {e}", C::KIND)))?;
        out.push(G::from(entity));
    }
    Ok(out)
}

#[Object]
impl QueryRoot {
    /// Get indexer status.
    async fn status<'ctx>(&self, ctx: &Context<'ctx>) -> Result<IndexerStatus> {
        let cursors = ctx.data::<Arc<dyn CursorStore>>()?;
        let cursor = cursors.get_any_cursor().await?;

        Ok(IndexerStatus {
            chain_id: cursor.as_ref().map(|c| c.chain_id.clone()),
            last_indexed_block: cursor.as_ref().map(|c| c.last_indexed_block),
            last_updated: cursor.map(|c| c.updated_at.to_rfc3339()),
        })
    }

    async fn token<'ctx>(&self, ctx: &Context<'ctx>, id: String) -> Result<Option<Token>> {
        one::<core::Token, _>(ctx, &id).await
    }

    async fn tokens<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Token>> {
        many::<core::Token, _>(ctx, first, skip).await
    }

    async fn timelocked_token<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        id: String,
    ) -> Result<Option<TimelockedToken>> {
        one::<core::TimelockedToken, _>(ctx, &id).await
    }

    async fn timelocked_tokens<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<TimelockedToken>> {
        many::<core::TimelockedToken, _>(ctx, first, skip).await
    }

    async fn crowd_sale<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        id: String,
    ) -> Result<Option<CrowdSale>> {
        one::<core::CrowdSale, _>(ctx, &id).await
    }

    async fn crowd_sales<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<CrowdSale>> {
        many::<core::CrowdSale, _>(ctx, first, skip).await
    }

    async fn contribution<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        id: String,
    ) -> Result<Option<Contribution>> {
        one::<core::Contribution, _>(ctx, &id).await
    }

    async fn contributions<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Contribution>> {
        many::<core::Contribution, _>(ctx, first, skip).await
    }

    async fn ipnft<'ctx>(&self, ctx: &Context<'ctx>, id: String) -> Result<Option<Ipnft>> {
        one::<core::Ipnft, _>(ctx, &id).await
    }

    async fn ipnfts<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Ipnft>> {
        many::<core::Ipnft, _>(ctx, first, skip).await
    }

    async fn reservation<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        id: String,
    ) -> Result<Option<Reservation>> {
        one::<core::Reservation, _>(ctx, &id).await
    }

    async fn reservations<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Reservation>> {
        many::<core::Reservation, _>(ctx, first, skip).await
    }

    async fn fractionalized_token<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        id: String,
    ) -> Result<Option<Fractionalized>> {
        one::<core::Fractionalized, _>(ctx, &id).await
    }

    async fn fractionalized_tokens<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Fractionalized>> {
        many::<core::Fractionalized, _>(ctx, first, skip).await
    }

    async fn fraction<'ctx>(&self, ctx: &Context<'ctx>, id: String) -> Result<Option<Fraction>> {
        one::<core::Fraction, _>(ctx, &id).await
    }

    async fn fractions<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Fraction>> {
        many::<core::Fraction, _>(ctx, first, skip).await
    }

    async fn mintpass<'ctx>(&self, ctx: &Context<'ctx>, id: String) -> Result<Option<Mintpass>> {
        one::<core::Mintpass, _>(ctx, &id).await
    }

    async fn mintpasses<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Mintpass>> {
        many::<core::Mintpass, _>(ctx, first, skip).await
    }

    async fn locked_schedule<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        id: String,
    ) -> Result<Option<LockedSchedule>> {
        one::<core::LockedSchedule, _>(ctx, &id).await
    }

    async fn locked_schedules<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<LockedSchedule>> {
        many::<core::LockedSchedule, _>(ctx, first, skip).await
    }

    async fn listing<'ctx>(&self, ctx: &Context<'ctx>, id: String) -> Result<Option<Listing>> {
        one::<core::Listing, _>(ctx, &id).await
    }

    async fn listings<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Listing>> {
        many::<core::Listing, _>(ctx, first, skip).await
    }

    /// Look up an ingested metadata document by content id.
    async fn ipnft_metadata<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        id: String,
    ) -> Result<Option<IpnftMetadata>> {
        one::<core::IpnftMetadata, _>(ctx, &id).await
    }
}

/// Indexer status.
#[derive(async_graphql::SimpleObject)]
pub struct IndexerStatus {
    pub chain_id: Option<String>,
    pub last_indexed_block: Option<u64>,
    pub last_updated: Option<String>,
}

// -----------------------------------------------------------------------------
// Validation
// -----------------------------------------------------------------------------

/// Clamp the `first` pagination argument to 1..=MAX_PAGE_SIZE.
pub(crate) fn page_first(first: Option<i32>) -> u32 {
    first.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as u32
}

/// Clamp the `skip` pagination argument to >= 0.
pub(crate) fn page_skip(skip: Option<i32>) -> u32 {
    skip.unwrap_or(0).max(0) as u32
}

/// Validate an id argument.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(async_graphql::Error::new("id cannot be empty"));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(async_graphql::Error::new(format!(
            "id too long: maximum {MAX_ID_LENGTH} characters allowed"
        )));
    }
    Ok(())
}
