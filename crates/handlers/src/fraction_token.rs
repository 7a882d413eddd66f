//! Claim-token (fraction) balance projections.
//!
//! Transfers on a claim-token contract drive three accumulators: the
//! parent's `totalIssued` (mints only, never decreases), its
//! `circulatingSupply` (mints minus burns), and per-holder Fraction
//! balances. Balances are signed so an out-of-order debit degrades to a
//! negative balance instead of wedging the projection.

use async_trait::async_trait;
use enzyme_core::entities::{Fraction, Fractionalized};
use enzyme_core::error::DomainResult;
use enzyme_core::metrics::record_missing_entity;
use enzyme_core::models::{Address, Amount, EventEnvelope, SignedAmount};
use enzyme_core::ports::{EntityStoreExt, EventHandler, HandlerContext};
use tracing::{instrument, trace, warn};

pub struct FractionTokenHandler;

impl FractionTokenHandler {
    /// Credit or debit one holder's balance, creating the Fraction document
    /// on first touch.
    async fn adjust_balance(
        &self,
        ctx: &HandlerContext,
        parent_id: &str,
        owner: &Address,
        amount: Amount,
        credit: bool,
    ) -> DomainResult<()> {
        let id = Fraction::id_for(parent_id, owner);
        let mut fraction = match ctx.store.load::<Fraction>(&id).await? {
            Some(existing) => existing,
            None => Fraction {
                id,
                fractionalized: parent_id.to_string(),
                owner: *owner,
                balance: SignedAmount::ZERO,
                agreement_signature: None,
            },
        };

        fraction.balance = if credit {
            fraction.balance.saturating_add_amount(amount)
        } else {
            fraction.balance.saturating_sub_amount(amount)
        };
        if fraction.balance.0 < 0 {
            warn!(fraction = %fraction.id, balance = %fraction.balance, "balance went negative");
        }
        Ok(ctx.store.save(&fraction).await?)
    }

    async fn on_transfer(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let from = crate::utils::address_param(event, "from")?;
        let to = crate::utils::address_param(event, "to")?;
        let value = crate::utils::amount_param(event, "value")?;

        let parent_id = Fractionalized::id_for(&event.address);
        let Some(mut parent) = ctx.store.load::<Fractionalized>(&parent_id).await? else {
            warn!(contract = %event.address, "transfer on unknown claim token, skipping");
            record_missing_entity("Fractionalized");
            return Ok(());
        };

        if from.is_zero() {
            // Mint: totalIssued only ever increases.
            parent.total_issued = parent.total_issued.saturating_add(value);
            parent.circulating_supply = parent.circulating_supply.saturating_add(value);
            ctx.store.save(&parent).await?;
            self.adjust_balance(ctx, &parent_id, &to, value, true).await?;
        } else if to.is_zero() {
            // Burn: reduces circulating, never issued.
            parent.circulating_supply = parent.circulating_supply.saturating_sub(value);
            ctx.store.save(&parent).await?;
            self.adjust_balance(ctx, &parent_id, &from, value, false).await?;
        } else {
            self.adjust_balance(ctx, &parent_id, &from, value, false).await?;
            self.adjust_balance(ctx, &parent_id, &to, value, true).await?;
        }

        trace!(contract = %event.address, value = %value, "transfer projected");
        Ok(())
    }

    async fn on_capped(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let parent_id = Fractionalized::id_for(&event.address);
        let Some(mut parent) = ctx.store.load::<Fractionalized>(&parent_id).await? else {
            warn!(contract = %event.address, "cap on unknown claim token, skipping");
            record_missing_entity("Fractionalized");
            return Ok(());
        };
        parent.capped = true;
        Ok(ctx.store.save(&parent).await?)
    }
}

#[async_trait]
impl EventHandler for FractionTokenHandler {
    fn template(&self) -> &'static str {
        "FractionToken"
    }

    #[instrument(skip_all, fields(event = %event.event, id = %event.id()))]
    async fn handle_event(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        match event.event.as_str() {
            "Transfer" => self.on_transfer(event, ctx).await,
            "Capped" => self.on_capped(event, ctx).await,
            other => {
                trace!(event = other, "unhandled event");
                Ok(())
            }
        }
    }
}
