//! Plain crowd-sale projections.
//!
//! The staked/locking variant shares the whole sale lifecycle with this
//! family (bid, settle, fail, bidder claim, issuer claim); those projections
//! live here as free functions and only `Started` differs per family.

use async_trait::async_trait;
use enzyme_core::entities::{Contribution, CrowdSale, SaleState, SaleType};
use enzyme_core::error::DomainResult;
use enzyme_core::metrics::{record_integrity_violation, record_missing_entity};
use enzyme_core::models::{Amount, EventEnvelope};
use enzyme_core::ports::{EntityStoreExt, EventHandler, HandlerContext};
use tracing::{debug, instrument, trace, warn};

use crate::common::ensure_token;
use crate::utils::{address_param, amount_param, id_param, opt_param, parse_address, u32_param, u64_param};

// =============================================================================
// Shared sale lifecycle projections
// =============================================================================

/// Load a sale or log the miss.
pub(crate) async fn load_sale(
    ctx: &HandlerContext,
    sale_id: &str,
    event: &str,
) -> DomainResult<Option<CrowdSale>> {
    let sale = ctx.store.load::<CrowdSale>(sale_id).await?;
    if sale.is_none() {
        warn!(sale = sale_id, event, "sale not indexed, skipping");
        record_missing_entity("CrowdSale");
    }
    Ok(sale)
}

/// Guard against writes into a settled or failed sale.
pub(crate) fn guard_terminal(sale: &CrowdSale, event: &str) -> bool {
    if sale.state.is_terminal() {
        warn!(
            sale = %sale.id,
            state = ?sale.state,
            event,
            "write into terminal sale rejected"
        );
        record_integrity_violation("CrowdSale");
        return true;
    }
    false
}

/// Load the (sale, bidder) contribution, creating it on first touch.
pub(crate) async fn load_or_create_contribution(
    ctx: &HandlerContext,
    sale_id: &str,
    bidder: &enzyme_core::models::Address,
    created_at: u64,
) -> DomainResult<Contribution> {
    let id = Contribution::id_for(sale_id, bidder);
    match ctx.store.load::<Contribution>(&id).await? {
        Some(existing) => Ok(existing),
        None => Ok(Contribution {
            id,
            crowd_sale: sale_id.to_string(),
            contributor: *bidder,
            amount: Amount::ZERO,
            staked_amount: Amount::ZERO,
            price: None,
            created_at,
            claimed_at: None,
            claimed_tx: None,
            claimed_tokens: None,
            refunded_tokens: None,
            claimed_stakes: None,
            refunded_stakes: None,
        }),
    }
}

/// Bid: accumulate onto the sale total and the bidder's contribution.
pub(crate) async fn project_bid(ctx: &HandlerContext, event: &EventEnvelope) -> DomainResult<()> {
    let sale_id = id_param(event, "saleId")?;
    let bidder = address_param(event, "bidder")?;
    let amount = amount_param(event, "amount")?;

    let Some(mut sale) = load_sale(ctx, &sale_id, &event.event).await? else {
        return Ok(());
    };
    if guard_terminal(&sale, &event.event) {
        return Ok(());
    }

    sale.amount_raised = sale.amount_raised.saturating_add(amount);
    ctx.store.save(&sale).await?;

    let mut contribution =
        load_or_create_contribution(ctx, &sale_id, &bidder, event.block_timestamp).await?;
    contribution.amount = contribution.amount.saturating_add(amount);
    ctx.store.save(&contribution).await?;

    trace!(sale = %sale_id, bidder = %bidder, amount = %amount, "bid projected");
    Ok(())
}

/// Settled/Failed: one-directional transition out of RUNNING.
pub(crate) async fn project_transition(
    ctx: &HandlerContext,
    event: &EventEnvelope,
    target: SaleState,
) -> DomainResult<()> {
    let sale_id = id_param(event, "saleId")?;
    let Some(mut sale) = load_sale(ctx, &sale_id, &event.event).await? else {
        return Ok(());
    };
    if sale.state == target {
        debug!(sale = %sale_id, state = ?target, "transition already applied");
        return Ok(());
    }
    if guard_terminal(&sale, &event.event) {
        return Ok(());
    }

    sale.state = target;
    ctx.store.save(&sale).await?;
    debug!(sale = %sale_id, state = ?target, "sale transitioned");
    Ok(())
}

/// Claimed: write-once bidder claim of auction tokens (and refunds).
pub(crate) async fn project_claimed(
    ctx: &HandlerContext,
    event: &EventEnvelope,
) -> DomainResult<()> {
    let sale_id = id_param(event, "saleId")?;
    let claimer = address_param(event, "claimer")?;
    let claimed = amount_param(event, "claimed")?;
    let refunded = amount_param(event, "refunded")?;

    let id = Contribution::id_for(&sale_id, &claimer);
    let Some(mut contribution) = ctx.store.load::<Contribution>(&id).await? else {
        warn!(contribution = %id, "claim for unknown contribution, skipping");
        record_missing_entity("Contribution");
        return Ok(());
    };

    if contribution.claimed_at.is_some() {
        warn!(contribution = %id, "claim already recorded, skipping rewrite");
        return Ok(());
    }

    contribution.claimed_at = Some(event.block_timestamp);
    contribution.claimed_tx = Some(event.tx_hash);
    contribution.claimed_tokens = Some(claimed);
    contribution.refunded_tokens = Some(refunded);
    ctx.store.save(&contribution).await?;
    Ok(())
}

/// ClaimedFundingGoal / ClaimedAuctionTokens: the issuer's terminal claim.
pub(crate) async fn project_issuer_claim(
    ctx: &HandlerContext,
    event: &EventEnvelope,
) -> DomainResult<()> {
    let sale_id = id_param(event, "saleId")?;
    let Some(mut sale) = load_sale(ctx, &sale_id, &event.event).await? else {
        return Ok(());
    };
    sale.claimed_at = Some(event.block_timestamp);
    ctx.store.save(&sale).await?;
    Ok(())
}

// =============================================================================
// Sale creation
// =============================================================================

/// Build the common part of a CrowdSale from a `Started` payload.
///
/// A sale cannot reference a token that was never indexed: when the auction
/// token is unresolvable, nothing is written and `None` comes back. The
/// bidding token is memoized opportunistically; a miss there only costs the
/// metadata cache entry.
pub(crate) async fn started_sale(
    ctx: &HandlerContext,
    event: &EventEnvelope,
    sale_type: SaleType,
) -> DomainResult<Option<CrowdSale>> {
    let auction_token = address_param(event, "sale.auctionToken")?;
    let bidding_token = address_param(event, "sale.biddingToken")?;

    if ensure_token(ctx, &auction_token).await?.is_none() {
        warn!(
            auction_token = %auction_token,
            event = %event.id(),
            "auction token unresolvable, sale not projected"
        );
        return Ok(None);
    }
    ensure_token(ctx, &bidding_token).await?;

    Ok(Some(CrowdSale {
        id: id_param(event, "saleId")?,
        sale_type,
        issuer: address_param(event, "issuer")?,
        beneficiary: address_param(event, "sale.beneficiary")?,
        auction_token,
        bidding_token,
        funding_goal: amount_param(event, "sale.fundingGoal")?,
        sales_amount: amount_param(event, "sale.salesAmount")?,
        amount_raised: Amount::ZERO,
        amount_staked: Amount::ZERO,
        closing_time: u64_param(event, "sale.closingTime")?,
        state: SaleState::Running,
        created_at: event.block_timestamp,
        claimed_at: None,
        permissioner: opt_param(event, "sale.permissioner")
            .and_then(parse_address)
            .filter(|a| !a.is_zero()),
        fee_bp: u32_param(event, "feeBp").ok(),
        staking_token: None,
        vested_staking_token: None,
        staking_duration: None,
        auction_locking_duration: None,
        wad_fixed_staked_per_bid_price: None,
    }))
}

// =============================================================================
// Handler
// =============================================================================

/// Handler for the plain crowd-sale contract.
pub struct CrowdSaleHandler;

#[async_trait]
impl EventHandler for CrowdSaleHandler {
    fn template(&self) -> &'static str {
        "CrowdSale"
    }

    #[instrument(skip_all, fields(event = %event.event, id = %event.id()))]
    async fn handle_event(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        match event.event.as_str() {
            "Started" => {
                let Some(sale) = started_sale(ctx, event, SaleType::Crowdsale).await? else {
                    return Ok(());
                };
                if ctx.store.load::<CrowdSale>(&sale.id).await?.is_some() {
                    debug!(sale = %sale.id, "sale already indexed, skipping");
                    return Ok(());
                }
                ctx.store.save(&sale).await?;
                debug!(sale = %sale.id, "sale created");
                Ok(())
            }
            "Bid" => project_bid(ctx, event).await,
            "Settled" => project_transition(ctx, event, SaleState::Settled).await,
            "Failed" => project_transition(ctx, event, SaleState::Failed).await,
            "Claimed" => project_claimed(ctx, event).await,
            "ClaimedFundingGoal" | "ClaimedAuctionTokens" => {
                project_issuer_claim(ctx, event).await
            }
            other => {
                trace!(event = other, "unhandled event");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::testing::*;
    use enzyme_core::entities::{EntityKind, Token};
    use serde_json::json;

    fn sale_contract() -> enzyme_core::models::Address {
        addr(0xc5)
    }

    /// Directory knows both sale tokens.
    fn sale_harness() -> Harness {
        let tokens = enzyme_core::ports::StaticTokens::new()
            .with(token_record(addr(0xa1), "IPT", "IP Token"))
            .with(token_record(addr(0xb1), "USDC", "USD Coin"));
        harness_with(tokens, enzyme_core::ports::StaticContent::new())
    }

    fn started_params(funding_goal: &str) -> serde_json::Value {
        json!({
            "saleId": "1",
            "issuer": addr(0x11).to_hex(),
            "feeBp": 50,
            "sale": {
                "auctionToken": addr(0xa1).to_hex(),
                "biddingToken": addr(0xb1).to_hex(),
                "beneficiary": addr(0x12).to_hex(),
                "fundingGoal": funding_goal,
                "salesAmount": "400000000000000000000000",
                "closingTime": 1_700_500_000u64,
                "permissioner": addr(0x13).to_hex(),
            }
        })
    }

    async fn run(h: &Harness, name: &str, params: serde_json::Value, block: u64, log: u32) {
        CrowdSaleHandler
            .handle_event(&event(sale_contract(), name, params, block, log), &h.ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn started_creates_sale_and_memoizes_tokens() {
        let h = sale_harness();
        run(&h, "Started", started_params("1000000"), 100, 0).await;

        let sale = h.store.load::<CrowdSale>("1").await.unwrap().unwrap();
        assert_eq!(sale.state, SaleState::Running);
        assert_eq!(sale.funding_goal, Amount(1_000_000));
        assert_eq!(sale.fee_bp, Some(50));
        assert_eq!(sale.permissioner, Some(addr(0x13)));
        assert_eq!(count(&h.store, EntityKind::Token).await, 2);
        let token = h
            .store
            .load::<Token>(&Token::id_for(&addr(0xa1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.symbol, "IPT");
    }

    // Test critique: une vente dont le token d'enchère est introuvable ne doit
    // rien écrire, ni vente ni Token de substitution
    #[tokio::test]
    async fn started_without_resolvable_auction_token_writes_nothing() {
        let h = harness();
        run(&h, "Started", started_params("1000000"), 100, 0).await;

        assert!(h.store.load::<CrowdSale>("1").await.unwrap().is_none());
        assert_eq!(count(&h.store, EntityKind::Token).await, 0);
    }

    #[tokio::test]
    async fn bids_accumulate_per_sale_and_per_bidder() {
        let h = sale_harness();
        run(&h, "Started", started_params("1000"), 100, 0).await;

        let bid =
            |amount: &str| json!({ "saleId": "1", "bidder": addr(0x21).to_hex(), "amount": amount });
        run(&h, "Bid", bid("300"), 101, 1).await;
        run(&h, "Bid", bid("200"), 102, 0).await;

        let sale = h.store.load::<CrowdSale>("1").await.unwrap().unwrap();
        assert_eq!(sale.amount_raised, Amount(500));

        let id = Contribution::id_for("1", &addr(0x21));
        let contribution = h.store.load::<Contribution>(&id).await.unwrap().unwrap();
        assert_eq!(contribution.amount, Amount(500));
        assert_eq!(count(&h.store, EntityKind::Contribution).await, 1);
    }

    // Test critique: un état terminal n'admet plus aucune écriture
    #[tokio::test]
    async fn terminal_sale_rejects_further_bids() {
        let h = sale_harness();
        run(&h, "Started", started_params("1000"), 100, 0).await;
        run(&h, "Settled", json!({ "saleId": "1" }), 101, 0).await;
        run(
            &h,
            "Bid",
            json!({ "saleId": "1", "bidder": addr(0x21).to_hex(), "amount": "300" }),
            102,
            0,
        )
        .await;

        let sale = h.store.load::<CrowdSale>("1").await.unwrap().unwrap();
        assert_eq!(sale.state, SaleState::Settled);
        assert_eq!(sale.amount_raised, Amount::ZERO);
        assert_eq!(count(&h.store, EntityKind::Contribution).await, 0);
    }

    #[tokio::test]
    async fn claim_is_write_once() {
        let h = sale_harness();
        run(&h, "Started", started_params("1000"), 100, 0).await;
        run(
            &h,
            "Bid",
            json!({ "saleId": "1", "bidder": addr(0x21).to_hex(), "amount": "300" }),
            101,
            0,
        )
        .await;
        run(&h, "Settled", json!({ "saleId": "1" }), 102, 0).await;

        let claim = json!({
            "saleId": "1",
            "claimer": addr(0x21).to_hex(),
            "claimed": "300",
            "refunded": "0"
        });
        run(&h, "Claimed", claim.clone(), 103, 0).await;
        let first = h
            .store
            .load::<Contribution>(&Contribution::id_for("1", &addr(0x21)))
            .await
            .unwrap()
            .unwrap();

        let rewrite = json!({
            "saleId": "1",
            "claimer": addr(0x21).to_hex(),
            "claimed": "999",
            "refunded": "999"
        });
        run(&h, "Claimed", rewrite, 104, 0).await;
        let second = h
            .store
            .load::<Contribution>(&Contribution::id_for("1", &addr(0x21)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.claimed_tokens, Some(Amount(300)));
    }

    #[tokio::test]
    async fn claim_for_unknown_contribution_is_skipped() {
        let h = sale_harness();
        run(&h, "Started", started_params("1000"), 100, 0).await;
        run(
            &h,
            "Claimed",
            json!({
                "saleId": "1",
                "claimer": addr(0x99).to_hex(),
                "claimed": "10",
                "refunded": "0"
            }),
            101,
            0,
        )
        .await;
        assert_eq!(count(&h.store, EntityKind::Contribution).await, 0);
    }

    #[tokio::test]
    async fn issuer_claim_sets_claimed_at() {
        let h = sale_harness();
        run(&h, "Started", started_params("1000"), 100, 0).await;
        run(&h, "Settled", json!({ "saleId": "1" }), 101, 0).await;
        run(&h, "ClaimedFundingGoal", json!({ "saleId": "1" }), 102, 0).await;

        let sale = h.store.load::<CrowdSale>("1").await.unwrap().unwrap();
        assert_eq!(sale.claimed_at, Some(1_700_000_102));
    }
}
