//! Mintpass projections.
//!
//! Mintpasses are soulbound: they appear on mint, change status on redeem or
//! revoke, and disappear on burn. Wallet-to-wallet transfers cannot happen
//! on-chain and are dropped if they ever show up.

use async_trait::async_trait;
use enzyme_core::entities::{Mintpass, MintpassStatus};
use enzyme_core::error::DomainResult;
use enzyme_core::metrics::record_missing_entity;
use enzyme_core::models::EventEnvelope;
use enzyme_core::ports::{EntityStoreExt, EventHandler, HandlerContext};
use tracing::{debug, instrument, trace, warn};

use crate::utils::{address_param, id_param};

pub struct MintpassHandler;

impl MintpassHandler {
    async fn on_transfer(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let from = address_param(event, "from")?;
        let to = address_param(event, "to")?;
        let token_id = id_param(event, "tokenId")?;

        if from.is_zero() {
            let pass = Mintpass {
                id: token_id,
                owner: to,
                status: MintpassStatus::Default,
                created_at: event.block_timestamp,
            };
            ctx.store.save(&pass).await?;
            debug!(pass = %pass.id, owner = %to, "mintpass created");
        } else if to.is_zero() {
            if ctx.store.remove::<Mintpass>(&token_id).await? {
                debug!(pass = %token_id, "mintpass burned");
            }
        } else {
            // Soulbound; the contract never emits these.
            warn!(pass = %token_id, "unexpected wallet-to-wallet mintpass transfer, ignoring");
        }
        Ok(())
    }

    async fn set_status(
        &self,
        event: &EventEnvelope,
        ctx: &HandlerContext,
        status: MintpassStatus,
    ) -> DomainResult<()> {
        let token_id = id_param(event, "tokenId")?;
        let Some(mut pass) = ctx.store.load::<Mintpass>(&token_id).await? else {
            warn!(pass = %token_id, event = %event.event, "status change for unknown mintpass, skipping");
            record_missing_entity("Mintpass");
            return Ok(());
        };
        pass.status = status;
        Ok(ctx.store.save(&pass).await?)
    }
}

#[async_trait]
impl EventHandler for MintpassHandler {
    fn template(&self) -> &'static str {
        "Mintpass"
    }

    #[instrument(skip_all, fields(event = %event.event, id = %event.id()))]
    async fn handle_event(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        match event.event.as_str() {
            "Transfer" => self.on_transfer(event, ctx).await,
            "Redeemed" => self.set_status(event, ctx, MintpassStatus::Redeemed).await,
            "Revoked" => self.set_status(event, ctx, MintpassStatus::Revoked).await,
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
    use enzyme_core::models::Address;
    use serde_json::json;

    async fn run(h: &Harness, name: &str, params: serde_json::Value, block: u64) {
        MintpassHandler
            .handle_event(&event(addr(0x3a), name, params, block, 0), &h.ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn mint_redeem_burn_lifecycle() {
        let h = harness();
        run(
            &h,
            "Transfer",
            json!({
                "from": Address::ZERO.to_hex(),
                "to": addr(0x21).to_hex(),
                "tokenId": "1"
            }),
            100,
        )
        .await;

        let pass = h.store.load::<Mintpass>("1").await.unwrap().unwrap();
        assert_eq!(pass.status, MintpassStatus::Default);
        assert_eq!(pass.owner, addr(0x21));

        run(&h, "Redeemed", json!({ "tokenId": "1" }), 101).await;
        let pass = h.store.load::<Mintpass>("1").await.unwrap().unwrap();
        assert_eq!(pass.status, MintpassStatus::Redeemed);

        run(
            &h,
            "Transfer",
            json!({
                "from": addr(0x21).to_hex(),
                "to": Address::ZERO.to_hex(),
                "tokenId": "1"
            }),
            102,
        )
        .await;
        assert!(h.store.load::<Mintpass>("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoked_for_unknown_pass_is_skipped() {
        let h = harness();
        run(&h, "Revoked", json!({ "tokenId": "9" }), 100).await;
        assert!(h.store.load::<Mintpass>("9").await.unwrap().is_none());
    }

    // Test critique: un transfert wallet-à-wallet ne doit rien modifier
    #[tokio::test]
    async fn wallet_transfer_is_ignored() {
        let h = harness();
        run(
            &h,
            "Transfer",
            json!({
                "from": Address::ZERO.to_hex(),
                "to": addr(0x21).to_hex(),
                "tokenId": "2"
            }),
            100,
        )
        .await;
        run(
            &h,
            "Transfer",
            json!({
                "from": addr(0x21).to_hex(),
                "to": addr(0x22).to_hex(),
                "tokenId": "2"
            }),
            101,
        )
        .await;

        let pass = h.store.load::<Mintpass>("2").await.unwrap().unwrap();
        assert_eq!(pass.owner, addr(0x21));
    }
}
