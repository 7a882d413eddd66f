//! Tokenizer projections.
//!
//! The tokenizer deploys one claim-token contract per fractionalized IP-NFT.
//! `TokensCreated` materializes the parent aggregate and registers the new
//! contract as a dynamic data source so its transfers flow into per-holder
//! balances from the next event onward.

use async_trait::async_trait;
use enzyme_core::entities::{Fractionalized, Token};
use enzyme_core::error::DomainResult;
use enzyme_core::models::{Amount, EventEnvelope};
use enzyme_core::ports::{EntityStoreExt, EventHandler, HandlerContext};
use enzyme_core::sources::SourceContext;
use tracing::{debug, instrument, trace};

use crate::common::spawn_data_source;
use crate::utils::{address_param, id_param, string_param};

/// Claim tokens are minted 1:1 against 18-decimal shares.
const CLAIM_TOKEN_DECIMALS: u32 = 18;

pub struct TokenizerHandler;

impl TokenizerHandler {
    async fn on_tokens_created(
        &self,
        event: &EventEnvelope,
        ctx: &HandlerContext,
    ) -> DomainResult<()> {
        let token_contract = address_param(event, "tokenContract")?;
        let id = Fractionalized::id_for(&token_contract);

        if ctx.store.load::<Fractionalized>(&id).await?.is_none() {
            let fractionalized = Fractionalized {
                id: id.clone(),
                name: string_param(event, "name")?,
                symbol: string_param(event, "symbol")?,
                decimals: CLAIM_TOKEN_DECIMALS,
                ipnft: id_param(event, "ipnftId")?,
                original_owner: address_param(event, "emitter")?,
                agreement_cid: string_param(event, "agreementCid")?,
                total_issued: Amount::ZERO,
                circulating_supply: Amount::ZERO,
                capped: false,
                created_at: event.block_timestamp,
            };
            ctx.store.save(&fractionalized).await?;
            debug!(contract = %token_contract, ipnft = %fractionalized.ipnft, "claim token created");

            // The metadata cache entry comes from the event itself; later
            // sales of this token resolve it without a directory lookup.
            let token_id = Token::id_for(&token_contract);
            if ctx.store.load::<Token>(&token_id).await?.is_none() {
                ctx.store
                    .save(&Token {
                        id: token_id,
                        decimals: CLAIM_TOKEN_DECIMALS,
                        symbol: fractionalized.symbol,
                        name: fractionalized.name,
                        locked_token: None,
                    })
                    .await?;
            }
        } else {
            debug!(contract = %token_contract, "claim token already indexed, skipping");
        }

        spawn_data_source(
            ctx,
            "FractionToken",
            token_contract,
            SourceContext::new(),
            event.block_number,
        )
        .await
    }
}

#[async_trait]
impl EventHandler for TokenizerHandler {
    fn template(&self) -> &'static str {
        "Tokenizer"
    }

    #[instrument(skip_all, fields(event = %event.event, id = %event.id()))]
    async fn handle_event(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        match event.event.as_str() {
            "TokensCreated" => self.on_tokens_created(event, ctx).await,
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
    use serde_json::json;

    fn tokens_created() -> serde_json::Value {
        json!({
            "tokenContract": addr(0xf0).to_hex(),
            "ipnftId": "3",
            "emitter": addr(0x31).to_hex(),
            "agreementCid": "QmAgreement",
            "symbol": "MOL-3",
            "name": "Molecule IPT 3"
        })
    }

    #[tokio::test]
    async fn tokens_created_materializes_parent_and_dynamic_source() {
        let h = harness();
        TokenizerHandler
            .handle_event(
                &event(addr(0x7a), "TokensCreated", tokens_created(), 100, 0),
                &h.ctx,
            )
            .await
            .unwrap();

        let parent = h
            .store
            .load::<Fractionalized>(&Fractionalized::id_for(&addr(0xf0)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parent.ipnft, "3");
        assert_eq!(parent.symbol, "MOL-3");
        assert_eq!(parent.total_issued, Amount::ZERO);
        assert!(!parent.capped);

        let instance = h.ctx.sources.resolve(&addr(0xf0)).unwrap();
        assert_eq!(instance.template, "FractionToken");

        // Metadata cache entry for the new contract, sourced from the event
        let token = h
            .store
            .load::<Token>(&Token::id_for(&addr(0xf0)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.symbol, "MOL-3");
        assert_eq!(token.decimals, 18);
    }

    // Test critique: une relivraison du même TokensCreated ne doit rien écraser
    #[tokio::test]
    async fn redelivery_is_idempotent() {
        let h = harness();
        for block in [100, 101] {
            TokenizerHandler
                .handle_event(
                    &event(addr(0x7a), "TokensCreated", tokens_created(), block, 0),
                    &h.ctx,
                )
                .await
                .unwrap();
        }

        assert_eq!(
            count(&h.store, enzyme_core::entities::EntityKind::Fractionalized).await,
            1
        );
        assert_eq!(h.ctx.sources.len(), 1);
    }
}
