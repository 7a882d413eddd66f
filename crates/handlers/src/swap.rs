//! Marketplace (swap) projections.
//!
//! Listings reference an already-indexed IP-NFT when possible; listing a
//! token the projection never saw keeps the reference null rather than
//! dropping the listing. The allowlist is a presence set: allowed means
//! the document exists.

use async_trait::async_trait;
use enzyme_core::entities::{Allowed, Ipnft, Listing};
use enzyme_core::error::DomainResult;
use enzyme_core::metrics::record_missing_entity;
use enzyme_core::models::EventEnvelope;
use enzyme_core::ports::{EntityStoreExt, EventHandler, HandlerContext};
use tracing::{debug, instrument, trace, warn};

use crate::utils::{address_param, amount_param, bool_param, id_param};

pub struct SwapHandler;

impl SwapHandler {
    async fn on_listed(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let token_id = id_param(event, "listing.tokenId")?;
        let ipnft = ctx
            .store
            .load::<Ipnft>(&token_id)
            .await?
            .map(|token| token.id);
        if ipnft.is_none() {
            warn!(token = %token_id, "listed token was never indexed, keeping null reference");
        }

        let listing = Listing {
            id: id_param(event, "listingId")?,
            creator: address_param(event, "listing.creator")?,
            ipnft,
            payment_token: address_param(event, "listing.paymentToken")?,
            ask_price: amount_param(event, "listing.askPrice")?,
            created_at: event.block_timestamp,
            unlisted_at: None,
            purchased_at: None,
            buyer: None,
        };
        ctx.store.save(&listing).await?;
        debug!(listing = %listing.id, "listing created");
        Ok(())
    }

    async fn load_listing(
        &self,
        ctx: &HandlerContext,
        id: &str,
        event: &str,
    ) -> DomainResult<Option<Listing>> {
        let listing = ctx.store.load::<Listing>(id).await?;
        if listing.is_none() {
            warn!(listing = id, event, "listing not indexed, skipping");
            record_missing_entity("Listing");
        }
        Ok(listing)
    }

    async fn on_unlisted(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let id = id_param(event, "listingId")?;
        let Some(mut listing) = self.load_listing(ctx, &id, &event.event).await? else {
            return Ok(());
        };
        listing.unlisted_at = Some(event.block_timestamp);
        Ok(ctx.store.save(&listing).await?)
    }

    async fn on_purchased(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let id = id_param(event, "listingId")?;
        let Some(mut listing) = self.load_listing(ctx, &id, &event.event).await? else {
            return Ok(());
        };
        listing.purchased_at = Some(event.block_timestamp);
        listing.buyer = Some(address_param(event, "buyer")?);
        Ok(ctx.store.save(&listing).await?)
    }

    async fn on_allowlist_updated(
        &self,
        event: &EventEnvelope,
        ctx: &HandlerContext,
    ) -> DomainResult<()> {
        let listing_id = id_param(event, "listingId")?;
        let buyer = address_param(event, "buyer")?;
        let allowed = bool_param(event, "_isAllowed")?;

        let id = Allowed::id_for(&listing_id, &buyer);
        if allowed {
            ctx.store
                .save(&Allowed {
                    id,
                    listing: listing_id,
                    buyer,
                })
                .await?;
        } else {
            ctx.store.remove::<Allowed>(&id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for SwapHandler {
    fn template(&self) -> &'static str {
        "SchmackoSwap"
    }

    #[instrument(skip_all, fields(event = %event.event, id = %event.id()))]
    async fn handle_event(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        match event.event.as_str() {
            "Listed" => self.on_listed(event, ctx).await,
            "Unlisted" => self.on_unlisted(event, ctx).await,
            "Purchased" => self.on_purchased(event, ctx).await,
            "AllowlistUpdated" => self.on_allowlist_updated(event, ctx).await,
            other => {
                trace!(event = other, "unhandled event");
                Ok(())
            }
        }
    }
}
