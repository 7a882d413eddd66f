//! Staked/locking crowd-sale projections.
//!
//! Extends the plain sale lifecycle with stake accounting and with the
//! locking contracts the sale factory deploys: `LockingContractCreated`
//! registers a dynamic data source so the new contract's schedule events
//! are delivered from that block onward.

use async_trait::async_trait;
use enzyme_core::entities::{Contribution, CrowdSale, SaleState, SaleType};
use enzyme_core::error::DomainResult;
use enzyme_core::models::EventEnvelope;
use enzyme_core::ports::{EntityStoreExt, EventHandler, HandlerContext};
use enzyme_core::sources::SourceContext;
use tracing::{debug, instrument, trace, warn};

use crate::common::{make_timelocked_token, spawn_data_source};
use crate::crowdsale::{
    guard_terminal, load_or_create_contribution, load_sale, project_bid, project_claimed,
    project_issuer_claim, project_transition, started_sale,
};
use crate::utils::{address_param, amount_param, id_param, opt_param, parse_address, u64_param};

/// Handler for the staked/locking crowd-sale contract.
pub struct StakedLockingCrowdSaleHandler;

impl StakedLockingCrowdSaleHandler {
    async fn on_started(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let Some(mut sale) = started_sale(ctx, event, SaleType::StakedLockingCrowdsale).await?
        else {
            return Ok(());
        };
        if ctx.store.load::<CrowdSale>(&sale.id).await?.is_some() {
            debug!(sale = %sale.id, "sale already indexed, skipping");
            return Ok(());
        }

        sale.staking_token = Some(address_param(event, "staking.stakedToken")?);
        sale.vested_staking_token = Some(address_param(event, "staking.stakesVestingContract")?);
        sale.wad_fixed_staked_per_bid_price =
            Some(amount_param(event, "staking.wadFixedStakedPerBidPrice")?);
        sale.staking_duration = Some(u64_param(event, "stakingDuration")?);
        sale.auction_locking_duration = Some(u64_param(event, "lockingDuration")?);

        // The factory announces the auction token's locking contract inline.
        if let Some(locking) = opt_param(event, "lockingToken").and_then(parse_address)
            && !locking.is_zero()
        {
            make_timelocked_token(ctx, &locking, &sale.auction_token).await?;
        }

        ctx.store.save(&sale).await?;
        debug!(sale = %sale.id, "staked sale created");
        Ok(())
    }

    /// Staked: accumulate onto the sale and contribution stake totals.
    async fn on_staked(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let sale_id = id_param(event, "saleId")?;
        let bidder = address_param(event, "bidder")?;
        let staked = amount_param(event, "stakedAmount")?;
        let price = amount_param(event, "price")?;

        let Some(mut sale) = load_sale(ctx, &sale_id, &event.event).await? else {
            return Ok(());
        };
        if guard_terminal(&sale, &event.event) {
            return Ok(());
        }

        sale.amount_staked = sale.amount_staked.saturating_add(staked);
        ctx.store.save(&sale).await?;

        let mut contribution =
            load_or_create_contribution(ctx, &sale_id, &bidder, event.block_timestamp).await?;
        contribution.staked_amount = contribution.staked_amount.saturating_add(staked);
        if contribution.price.is_none() {
            contribution.price = Some(price);
        }
        ctx.store.save(&contribution).await?;

        trace!(sale = %sale_id, bidder = %bidder, staked = %staked, "stake projected");
        Ok(())
    }

    /// ClaimedStakes: write-once stake claim on the contribution.
    async fn on_claimed_stakes(
        &self,
        event: &EventEnvelope,
        ctx: &HandlerContext,
    ) -> DomainResult<()> {
        let sale_id = id_param(event, "saleId")?;
        let claimer = address_param(event, "claimer")?;
        let claimed = amount_param(event, "stakesClaimed")?;
        let refunded = amount_param(event, "stakesRefunded")?;

        let id = Contribution::id_for(&sale_id, &claimer);
        let Some(mut contribution) = ctx.store.load::<Contribution>(&id).await? else {
            warn!(contribution = %id, "stake claim for unknown contribution, skipping");
            enzyme_core::metrics::record_missing_entity("Contribution");
            return Ok(());
        };

        if contribution.claimed_stakes.is_some() {
            warn!(contribution = %id, "stake claim already recorded, skipping rewrite");
            return Ok(());
        }

        contribution.claimed_stakes = Some(claimed);
        contribution.refunded_stakes = Some(refunded);
        ctx.store.save(&contribution).await?;
        Ok(())
    }

    /// LockingContractCreated: start indexing the freshly deployed vesting
    /// contract and link it to its underlying token.
    async fn on_locking_contract_created(
        &self,
        event: &EventEnvelope,
        ctx: &HandlerContext,
    ) -> DomainResult<()> {
        let underlying = address_param(event, "underlyingToken")?;
        let locking = address_param(event, "lockingContract")?;

        make_timelocked_token(ctx, &locking, &underlying).await?;

        let context = SourceContext::new()
            .with_address("ipt", underlying)
            .with_address("lockingContract", locking);
        spawn_data_source(ctx, "TimelockedToken", locking, context, event.block_number).await
    }
}

#[async_trait]
impl EventHandler for StakedLockingCrowdSaleHandler {
    fn template(&self) -> &'static str {
        "StakedLockingCrowdSale"
    }

    #[instrument(skip_all, fields(event = %event.event, id = %event.id()))]
    async fn handle_event(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        match event.event.as_str() {
            "Started" => self.on_started(event, ctx).await,
            "Bid" => project_bid(ctx, event).await,
            "Staked" => self.on_staked(event, ctx).await,
            "Settled" => project_transition(ctx, event, SaleState::Settled).await,
            "Failed" => project_transition(ctx, event, SaleState::Failed).await,
            "Claimed" => project_claimed(ctx, event).await,
            "ClaimedStakes" => self.on_claimed_stakes(event, ctx).await,
            "ClaimedFundingGoal" | "ClaimedAuctionTokens" => {
                project_issuer_claim(ctx, event).await
            }
            "LockingContractCreated" => self.on_locking_contract_created(event, ctx).await,
            other => {
                trace!(event = other, "unhandled event");
                Ok(())
            }
        }
    }
}
