//! Terms-acceptance projections.
//!
//! Holders sign the fractionalization agreement off-chain; the permissioner
//! contract emits `TermsAccepted` with the signature. The signature lands on
//! the holder's existing Fraction document. An acceptance arriving before
//! any token transfer has no balance to annotate and is skipped.

use async_trait::async_trait;
use enzyme_core::entities::{Fraction, Fractionalized};
use enzyme_core::error::DomainResult;
use enzyme_core::metrics::record_missing_entity;
use enzyme_core::models::EventEnvelope;
use enzyme_core::ports::{EntityStoreExt, EventHandler, HandlerContext};
use tracing::{debug, instrument, trace, warn};

use crate::utils::{address_param, hex_param};

pub struct PermissionerHandler;

impl PermissionerHandler {
    async fn on_terms_accepted(
        &self,
        event: &EventEnvelope,
        ctx: &HandlerContext,
    ) -> DomainResult<()> {
        let token_contract = address_param(event, "tokenContract")?;
        let signer = address_param(event, "signer")?;
        let signature = hex_param(event, "signature")?;

        let parent_id = Fractionalized::id_for(&token_contract);
        let id = Fraction::id_for(&parent_id, &signer);
        let Some(mut fraction) = ctx.store.load::<Fraction>(&id).await? else {
            warn!(fraction = %id, "terms accepted before any balance, skipping");
            record_missing_entity("Fraction");
            return Ok(());
        };
        fraction.agreement_signature = Some(signature);
        ctx.store.save(&fraction).await?;
        debug!(fraction = %fraction.id, "agreement signature recorded");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for PermissionerHandler {
    fn template(&self) -> &'static str {
        "TermsAcceptedPermissioner"
    }

    #[instrument(skip_all, fields(event = %event.event, id = %event.id()))]
    async fn handle_event(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        match event.event.as_str() {
            "TermsAccepted" => self.on_terms_accepted(event, ctx).await,
            other => {
                trace!(event = other, "unhandled event");
                Ok(())
            }
        }
    }
}
