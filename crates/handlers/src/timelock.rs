//! Vesting-schedule projections for timelocked token contracts.
//!
//! These contracts are only ever watched dynamically: the creation context
//! carries the contract address, because schedule events themselves have no
//! back-reference to the contract that owns them.

use async_trait::async_trait;
use enzyme_core::entities::LockedSchedule;
use enzyme_core::error::{DomainError, DomainResult};
use enzyme_core::metrics::record_missing_entity;
use enzyme_core::models::{Address, EventEnvelope};
use enzyme_core::ports::{EntityStoreExt, EventHandler, HandlerContext};
use tracing::{debug, instrument, trace, warn};

use crate::utils::{address_param, amount_param, hex_param, u64_param};

pub struct TimelockHandler;

impl TimelockHandler {
    fn contract_from_context(&self, ctx: &HandlerContext) -> DomainResult<Address> {
        ctx.source_context
            .as_ref()
            .and_then(|c| c.address("lockingContract"))
            .ok_or_else(|| DomainError::MissingContext("TimelockedToken".to_string()))
    }

    async fn on_schedule_created(
        &self,
        event: &EventEnvelope,
        ctx: &HandlerContext,
    ) -> DomainResult<()> {
        let token_contract = self.contract_from_context(ctx)?;
        let schedule = LockedSchedule {
            id: hex_param(event, "scheduleId")?,
            token_contract,
            beneficiary: address_param(event, "beneficiary")?,
            amount: amount_param(event, "amount")?,
            expires_at: u64_param(event, "expiresAt")?,
            claimed_at: None,
        };
        ctx.store.save(&schedule).await?;
        debug!(schedule = %schedule.id, contract = %token_contract, "schedule created");
        Ok(())
    }

    async fn on_schedule_released(
        &self,
        event: &EventEnvelope,
        ctx: &HandlerContext,
    ) -> DomainResult<()> {
        let id = hex_param(event, "scheduleId")?;
        let Some(mut schedule) = ctx.store.load::<LockedSchedule>(&id).await? else {
            warn!(schedule = %id, "release of unknown schedule, skipping");
            record_missing_entity("LockedSchedule");
            return Ok(());
        };
        schedule.claimed_at = Some(event.block_timestamp);
        Ok(ctx.store.save(&schedule).await?)
    }
}

#[async_trait]
impl EventHandler for TimelockHandler {
    fn template(&self) -> &'static str {
        "TimelockedToken"
    }

    #[instrument(skip_all, fields(event = %event.event, id = %event.id()))]
    async fn handle_event(&self, event: &EventEnvelope, ctx: &HandlerContext) -> DomainResult<()> {
        match event.event.as_str() {
            "ScheduleCreated" => self.on_schedule_created(event, ctx).await,
            "ScheduleReleased" => self.on_schedule_released(event, ctx).await,
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
    use enzyme_core::models::Amount;
    use enzyme_core::sources::SourceContext;
    use serde_json::json;

    fn locking_contract() -> Address {
        addr(0xf2)
    }

    fn schedule_id() -> String {
        format!("0x{}", "5c".repeat(32))
    }

    fn ctx_with_contract(h: &Harness) -> HandlerContext {
        h.ctx.with_source_context(
            SourceContext::new().with_address("lockingContract", locking_contract()),
        )
    }

    #[tokio::test]
    async fn schedule_lifecycle() {
        let h = harness();
        let ctx = ctx_with_contract(&h);

        TimelockHandler
            .handle_event(
                &event(
                    locking_contract(),
                    "ScheduleCreated",
                    json!({
                        "scheduleId": schedule_id(),
                        "beneficiary": addr(0x21).to_hex(),
                        "amount": "5000",
                        "expiresAt": 1_732_000_000u64
                    }),
                    100,
                    0,
                ),
                &ctx,
            )
            .await
            .unwrap();

        let schedule = h
            .store
            .load::<LockedSchedule>(&schedule_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(schedule.token_contract, locking_contract());
        assert_eq!(schedule.amount, Amount(5000));
        assert!(schedule.claimed_at.is_none());

        TimelockHandler
            .handle_event(
                &event(
                    locking_contract(),
                    "ScheduleReleased",
                    json!({ "scheduleId": schedule_id() }),
                    110,
                    0,
                ),
                &ctx,
            )
            .await
            .unwrap();

        let schedule = h
            .store
            .load::<LockedSchedule>(&schedule_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(schedule.claimed_at, Some(1_700_000_110));
    }

    // Test critique: sans contexte de source dynamique, l'événement est
    // une erreur de domaine, pas une panique
    #[tokio::test]
    async fn missing_context_is_a_domain_error() {
        let h = harness();
        let err = TimelockHandler
            .handle_event(
                &event(
                    locking_contract(),
                    "ScheduleCreated",
                    json!({
                        "scheduleId": schedule_id(),
                        "beneficiary": addr(0x21).to_hex(),
                        "amount": "5000",
                        "expiresAt": 1_732_000_000u64
                    }),
                    100,
                    0,
                ),
                &h.ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::MissingContext(_)));
    }
}
