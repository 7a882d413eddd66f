//! Default handler registry.

use std::sync::Arc;

use enzyme_core::ports::HandlerRegistry;

use crate::crowdsale::CrowdSaleHandler;
use crate::fraction_token::FractionTokenHandler;
use crate::ipnft::IpnftHandler;
use crate::mintpass::MintpassHandler;
use crate::permissioner::PermissionerHandler;
use crate::staked_crowdsale::StakedLockingCrowdSaleHandler;
use crate::swap::SwapHandler;
use crate::timelock::TimelockHandler;
use crate::tokenizer::TokenizerHandler;

/// Registry with every handler family registered.
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(CrowdSaleHandler));
    registry.register(Arc::new(StakedLockingCrowdSaleHandler));
    registry.register(Arc::new(TokenizerHandler));
    registry.register(Arc::new(FractionTokenHandler));
    registry.register(Arc::new(IpnftHandler));
    registry.register(Arc::new(MintpassHandler));
    registry.register(Arc::new(TimelockHandler));
    registry.register(Arc::new(PermissionerHandler));
    registry.register(Arc::new(SwapHandler));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::testing::addr;
    use async_trait::async_trait;
    use enzyme_core::entities::{CrowdSale, Fractionalized, LockedSchedule, SaleState};
    use enzyme_core::error::SourceResult;
    use enzyme_core::models::{
        Address, Amount, EventEnvelope, LedgerBlock, Manifest, StaticSource, TxHash,
    };
    use enzyme_core::ports::{
        BlockStream, CursorStore, EntityStore, EntityStoreExt, EventSource, HandlerContext,
        StaticContent, StaticTokens,
    };
    use enzyme_core::services::IndexerService;
    use enzyme_core::sources::DataSourceRegistry;
    use enzyme_core::store::{MemoryCursor, MemoryStore};
    use serde_json::json;

    const CHAIN: &str = "11155111";

    fn tokenizer() -> Address {
        addr(0x7a)
    }
    fn sale_contract() -> Address {
        addr(0xd5)
    }
    fn fraction_contract() -> Address {
        addr(0xf0)
    }
    fn locking_contract() -> Address {
        addr(0xf2)
    }
    fn schedule_id() -> String {
        format!("0x{}", "5c".repeat(32))
    }

    struct ScriptedSource(Vec<LedgerBlock>);

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn chain_id(&self) -> SourceResult<String> {
            Ok(CHAIN.to_string())
        }

        async fn stream_from(&self, from_block: u64) -> SourceResult<BlockStream> {
            let blocks: Vec<_> = self
                .0
                .iter()
                .filter(|b| b.number >= from_block)
                .cloned()
                .map(Ok)
                .collect();
            Ok(Box::pin(futures::stream::iter(blocks)))
        }
    }

    fn envelope(
        address: Address,
        block: u64,
        log_index: u32,
        name: &str,
        params: serde_json::Value,
    ) -> EventEnvelope {
        EventEnvelope {
            address,
            event: name.to_string(),
            params,
            block_number: block,
            block_timestamp: 1_700_000_000 + block,
            tx_hash: TxHash([0x42; 32]),
            log_index,
            tx_log_index: log_index,
        }
    }

    /// One realistic end-to-end journal: fractionalize, sell, lock, vest.
    fn journal() -> Vec<LedgerBlock> {
        vec![
            LedgerBlock {
                number: 100,
                timestamp: 1_700_000_100,
                events: vec![envelope(
                    tokenizer(),
                    100,
                    0,
                    "TokensCreated",
                    json!({
                        "tokenContract": fraction_contract().to_hex(),
                        "ipnftId": "3",
                        "emitter": addr(0x31).to_hex(),
                        "agreementCid": "QmAgreement",
                        "symbol": "MOL-3",
                        "name": "Molecule IPT 3"
                    }),
                )],
            },
            LedgerBlock {
                number: 101,
                timestamp: 1_700_000_101,
                events: vec![envelope(
                    fraction_contract(),
                    101,
                    0,
                    "Transfer",
                    json!({
                        "from": Address::ZERO.to_hex(),
                        "to": addr(0x31).to_hex(),
                        "value": "1000000"
                    }),
                )],
            },
            LedgerBlock {
                number: 102,
                timestamp: 1_700_000_102,
                events: vec![
                    envelope(
                        sale_contract(),
                        102,
                        0,
                        "Started",
                        json!({
                            "saleId": "1",
                            "issuer": addr(0x31).to_hex(),
                            "feeBp": 0,
                            "sale": {
                                "auctionToken": fraction_contract().to_hex(),
                                "biddingToken": addr(0xb1).to_hex(),
                                "beneficiary": addr(0x31).to_hex(),
                                "fundingGoal": "500",
                                "salesAmount": "400000",
                                "closingTime": 1_700_500_000u64,
                                "permissioner": addr(0x13).to_hex(),
                            },
                            "staking": {
                                "stakedToken": addr(0xe1).to_hex(),
                                "stakesVestingContract": addr(0xe2).to_hex(),
                                "wadFixedStakedPerBidPrice": "1000000000000000000"
                            },
                            "stakingDuration": 15_552_000u64,
                            "lockingDuration": 15_552_000u64,
                            "lockingToken": locking_contract().to_hex(),
                        }),
                    ),
                    envelope(
                        sale_contract(),
                        102,
                        1,
                        "LockingContractCreated",
                        json!({
                            "underlyingToken": fraction_contract().to_hex(),
                            "lockingContract": locking_contract().to_hex(),
                        }),
                    ),
                ],
            },
            LedgerBlock {
                number: 103,
                timestamp: 1_700_000_103,
                events: vec![
                    envelope(
                        sale_contract(),
                        103,
                        0,
                        "Bid",
                        json!({ "saleId": "1", "bidder": addr(0x21).to_hex(), "amount": "300" }),
                    ),
                    envelope(
                        sale_contract(),
                        103,
                        1,
                        "Bid",
                        json!({ "saleId": "1", "bidder": addr(0x21).to_hex(), "amount": "200" }),
                    ),
                ],
            },
            LedgerBlock {
                number: 104,
                timestamp: 1_700_000_104,
                events: vec![
                    envelope(sale_contract(), 104, 0, "Settled", json!({ "saleId": "1" })),
                    // Delivered because block 102 registered the contract.
                    envelope(
                        locking_contract(),
                        104,
                        1,
                        "ScheduleCreated",
                        json!({
                            "scheduleId": schedule_id(),
                            "beneficiary": addr(0x21).to_hex(),
                            "amount": "500",
                            "expiresAt": 1_732_000_000u64
                        }),
                    ),
                ],
            },
        ]
    }

    struct Pipeline {
        store: Arc<MemoryStore>,
        cursors: Arc<MemoryCursor>,
        service: IndexerService,
    }

    fn pipeline(blocks: Vec<LedgerBlock>) -> Pipeline {
        let store = Arc::new(MemoryStore::new());
        let cursors = Arc::new(MemoryCursor::new());
        let ctx = HandlerContext::new(
            store.clone() as Arc<dyn EntityStore>,
            Arc::new(DataSourceRegistry::new()),
            Arc::new(StaticTokens::new()),
            Arc::new(StaticContent::new()),
        );
        let manifest = Manifest {
            chain_id: CHAIN.to_string(),
            sources: vec![
                StaticSource {
                    template: "Tokenizer".to_string(),
                    address: tokenizer(),
                    start_block: 0,
                },
                StaticSource {
                    template: "StakedLockingCrowdSale".to_string(),
                    address: sale_contract(),
                    start_block: 0,
                },
            ],
        };
        let service = IndexerService::new(
            manifest,
            Arc::new(ScriptedSource(blocks)),
            cursors.clone(),
            Arc::new(default_registry()),
            ctx,
        );
        Pipeline {
            store,
            cursors,
            service,
        }
    }

    async fn drain(p: &Pipeline) {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        p.service.run(rx).await.unwrap();
    }

    #[test]
    fn default_registry_covers_every_template() {
        let registry = default_registry();
        assert_eq!(
            registry.templates(),
            vec![
                "CrowdSale",
                "FractionToken",
                "IPNFT",
                "Mintpass",
                "SchmackoSwap",
                "StakedLockingCrowdSale",
                "TermsAcceptedPermissioner",
                "TimelockedToken",
                "Tokenizer",
            ]
        );
    }

    #[tokio::test]
    async fn whole_pipeline_projects_the_journal() {
        let p = pipeline(journal());
        drain(&p).await;

        let sale = p.store.load::<CrowdSale>("1").await.unwrap().unwrap();
        assert_eq!(sale.amount_raised, Amount(500));
        assert_eq!(sale.state, SaleState::Settled);

        let parent = p
            .store
            .load::<Fractionalized>(&Fractionalized::id_for(&fraction_contract()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parent.total_issued, Amount(1_000_000));

        // Events of the dynamically created contract reached their handler
        // with the stored context.
        let schedule = p
            .store
            .load::<LockedSchedule>(&schedule_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(schedule.token_contract, locking_contract());

        let cursor = p.cursors.get_cursor(CHAIN).await.unwrap().unwrap();
        assert_eq!(cursor.last_indexed_block, 104);
    }

    // Test critique: rejouer le même journal sur un état vierge doit produire
    // un état final identique octet par octet
    #[tokio::test]
    async fn replay_is_deterministic() {
        let first = pipeline(journal());
        drain(&first).await;

        let second = pipeline(journal());
        drain(&second).await;

        assert_eq!(first.store.snapshot(), second.store.snapshot());
    }

    #[tokio::test]
    async fn redelivered_blocks_are_skipped_idempotently() {
        let baseline = pipeline(journal());
        drain(&baseline).await;
        let expected = baseline.store.snapshot();

        // Même journal, puis une seconde passe complète sur le même état.
        let p = pipeline(journal());
        drain(&p).await;
        drain(&p).await;

        assert_eq!(p.store.snapshot(), expected);
    }

    #[tokio::test]
    async fn restart_restores_dynamic_sources() {
        // First run indexes only up to the registration block.
        let mut head = journal();
        let tail = head.split_off(3);
        let p = pipeline(head);
        drain(&p).await;
        let store = p.store.clone();

        // Simulated restart: fresh registry, same store and cursor.
        let ctx = HandlerContext::new(
            store.clone() as Arc<dyn EntityStore>,
            Arc::new(DataSourceRegistry::new()),
            Arc::new(StaticTokens::new()),
            Arc::new(StaticContent::new()),
        );
        let service = IndexerService::new(
            Manifest {
                chain_id: CHAIN.to_string(),
                sources: vec![StaticSource {
                    template: "StakedLockingCrowdSale".to_string(),
                    address: sale_contract(),
                    start_block: 0,
                }],
            },
            Arc::new(ScriptedSource(tail)),
            p.cursors.clone(),
            Arc::new(default_registry()),
            ctx,
        );
        let (_tx, rx) = tokio::sync::watch::channel(false);
        service.run(rx).await.unwrap();

        // The schedule on the dynamic contract was projected after restart.
        let schedule = store
            .load::<LockedSchedule>(&schedule_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(schedule.beneficiary, addr(0x21));
    }
}
