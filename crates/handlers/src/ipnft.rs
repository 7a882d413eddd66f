//! IP-NFT registry projections.
//!
//! Covers the reservation lifecycle (reserve, update URI, mint consumes the
//! reservation) and ownership tracking. Minting also triggers metadata
//! ingestion when the token URI points into the content-addressed store.

use async_trait::async_trait;
use enzyme_core::entities::{Ipnft, Reservation};
use enzyme_core::error::DomainResult;
use enzyme_core::metrics::record_missing_entity;
use enzyme_core::models::EventEnvelope;
use enzyme_core::ports::{EntityStoreExt, EventHandler, HandlerContext};
use tracing::{debug, instrument, trace, warn};

use crate::metadata;
use crate::utils::{address_param, id_param, opt_param, string_param};

pub struct IpnftHandler;

impl IpnftHandler {
    async fn on_reserved(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let reservation = Reservation {
            id: id_param(event, "reservationId")?,
            owner: address_param(event, "reserver")?,
            uri: None,
            created_at: event.block_timestamp,
        };
        ctx.store.save(&reservation).await?;
        debug!(reservation = %reservation.id, "reservation created");
        Ok(())
    }

    async fn on_reservation_uri_updated(
        &self,
        event: &EventEnvelope,
        ctx: &HandlerContext,
    ) -> DomainResult<()> {
        let id = id_param(event, "reservationId")?;
        let Some(mut reservation) = ctx.store.load::<Reservation>(&id).await? else {
            warn!(reservation = %id, "URI update for unknown reservation, skipping");
            record_missing_entity("Reservation");
            return Ok(());
        };
        reservation.uri = Some(string_param(event, "tokenURI")?);
        Ok(ctx.store.save(&reservation).await?)
    }

    async fn on_minted(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let token_id = id_param(event, "tokenId")?;
        let token_uri = string_param(event, "tokenURI")?;

        // The reservation is consumed by the mint.
        if ctx.store.remove::<Reservation>(&token_id).await? {
            debug!(token = %token_id, "reservation consumed by mint");
        }

        if ctx.store.load::<Ipnft>(&token_id).await?.is_some() {
            debug!(token = %token_id, "token already indexed, skipping");
            return Ok(());
        }

        let metadata_cid = metadata::ingest(ctx, &token_uri).await?;
        let ipnft = Ipnft {
            id: token_id,
            owner: address_param(event, "owner")?,
            token_uri,
            symbol: opt_param(event, "symbol")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            metadata: metadata_cid,
            created_at: event.block_timestamp,
        };
        ctx.store.save(&ipnft).await?;
        debug!(token = %ipnft.id, "token minted");
        Ok(())
    }

    async fn on_transfer(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        let from = address_param(event, "from")?;
        let to = address_param(event, "to")?;
        let token_id = id_param(event, "tokenId")?;

        if to.is_zero() {
            if ctx.store.remove::<Ipnft>(&token_id).await? {
                debug!(token = %token_id, "token burned");
            }
            return Ok(());
        }
        if from.is_zero() {
            // Mint transfers are covered by the dedicated mint event.
            return Ok(());
        }

        let Some(mut ipnft) = ctx.store.load::<Ipnft>(&token_id).await? else {
            warn!(token = %token_id, "transfer of unknown token, skipping");
            record_missing_entity("Ipnft");
            return Ok(());
        };
        ipnft.owner = to;
        Ok(ctx.store.save(&ipnft).await?)
    }
}

#[async_trait]
impl EventHandler for IpnftHandler {
    fn template(&self) -> &'static str {
        "IPNFT"
    }

    #[instrument(skip_all, fields(event = %event.event, id = %event.id()))]
    async fn handle_event(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        match event.event.as_str() {
            "Reserved" => self.on_reserved(event, ctx).await,
            "ReservationURIUpdated" => self.on_reservation_uri_updated(event, ctx).await,
            "IPNFTMinted" | "TokenMinted" => self.on_minted(event, ctx).await,
            "Transfer" => self.on_transfer(event, ctx).await,
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
    use enzyme_core::entities::{EntityKind, IpnftMetadata};
    use enzyme_core::models::Address;
    use enzyme_core::ports::{StaticContent, StaticTokens};
    use serde_json::json;

    fn registry_contract() -> Address {
        addr(0x1f)
    }

    async fn run(h: &Harness, name: &str, params: serde_json::Value, block: u64) {
        IpnftHandler
            .handle_event(&event(registry_contract(), name, params, block, 0), &h.ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn mint_consumes_reservation_and_ingests_metadata() {
        let doc = json!({ "name": "Molecule One", "properties": { "topic": "longevity" } });
        let content = StaticContent::new().with("QmMeta", doc.to_string().as_bytes());
        let h = harness_with(StaticTokens::new(), content);

        run(
            &h,
            "Reserved",
            json!({ "reservationId": "5", "reserver": addr(0x21).to_hex() }),
            100,
        )
        .await;
        run(
            &h,
            "ReservationURIUpdated",
            json!({ "reservationId": "5", "tokenURI": "ipfs://QmMeta" }),
            101,
        )
        .await;
        run(
            &h,
            "IPNFTMinted",
            json!({
                "tokenId": "5",
                "owner": addr(0x21).to_hex(),
                "tokenURI": "ipfs://QmMeta",
                "symbol": "IPNFT-5"
            }),
            102,
        )
        .await;

        assert_eq!(count(&h.store, EntityKind::Reservation).await, 0);

        let ipnft = h.store.load::<Ipnft>("5").await.unwrap().unwrap();
        assert_eq!(ipnft.owner, addr(0x21));
        assert_eq!(ipnft.metadata.as_deref(), Some("QmMeta"));
        assert_eq!(ipnft.symbol.as_deref(), Some("IPNFT-5"));

        let metadata = h
            .store
            .load::<IpnftMetadata>("QmMeta")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metadata.name.as_deref(), Some("Molecule One"));
        assert_eq!(metadata.topic.as_deref(), Some("longevity"));
    }

    // Test critique: un échec d'ingestion ne doit jamais faire échouer le mint
    #[tokio::test]
    async fn mint_survives_unresolvable_metadata() {
        let h = harness();
        run(
            &h,
            "IPNFTMinted",
            json!({
                "tokenId": "6",
                "owner": addr(0x22).to_hex(),
                "tokenURI": "ipfs://QmMissing"
            }),
            100,
        )
        .await;

        let ipnft = h.store.load::<Ipnft>("6").await.unwrap().unwrap();
        assert!(ipnft.metadata.is_none());
        assert!(ipnft.symbol.is_none());
        assert_eq!(count(&h.store, EntityKind::IpnftMetadata).await, 0);
    }

    #[tokio::test]
    async fn transfer_updates_owner_and_burn_deletes() {
        let h = harness();
        run(
            &h,
            "IPNFTMinted",
            json!({
                "tokenId": "7",
                "owner": addr(0x21).to_hex(),
                "tokenURI": "https://example.org/7.json"
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
                "tokenId": "7"
            }),
            101,
        )
        .await;
        let ipnft = h.store.load::<Ipnft>("7").await.unwrap().unwrap();
        assert_eq!(ipnft.owner, addr(0x22));

        run(
            &h,
            "Transfer",
            json!({
                "from": addr(0x22).to_hex(),
                "to": Address::ZERO.to_hex(),
                "tokenId": "7"
            }),
            102,
        )
        .await;
        assert!(h.store.load::<Ipnft>("7").await.unwrap().is_none());
    }
}
