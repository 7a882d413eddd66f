//! Analytics relay: forwards bid activity to external dashboard queries.
//!
//! When a Dune API key is configured, every projected `Bid` event triggers a
//! refresh of a fixed set of saved queries, parameterized by sale id and
//! chain. Posts are fire-and-forget: a failed refresh is logged and counted,
//! never retried, and never affects projection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use enzyme_core::error::DomainResult;
use enzyme_core::metrics::record_relay_post;
use enzyme_core::models::EventEnvelope;
use enzyme_core::ports::{EventHandler, HandlerContext};

/// Saved query ids refreshed on every bid.
const QUERY_IDS: [u64; 4] = [2_709_374, 2_709_364, 4_186_294, 4_186_293];

const API_BASE: &str = "https://api.dune.com/api/v1/query";

/// Client for the analytics query-execution API.
pub struct AnalyticsRelay {
    client: reqwest::Client,
    api_key: String,
    chain: &'static str,
}

impl AnalyticsRelay {
    pub fn new(api_key: String, chain_id: &str) -> Self {
        let chain = if chain_id == "11155111" {
            "sepolia"
        } else {
            "ethereum"
        };
        Self {
            client: reqwest::Client::new(),
            api_key,
            chain,
        }
    }

    /// Trigger a refresh of every saved query for one sale.
    pub async fn notify_bid(&self, sale_id: &str) {
        for query_id in QUERY_IDS {
            let url = format!("{API_BASE}/{query_id}/execute");
            let body = serde_json::json!({
                "query_parameters": { "saleId": sale_id, "chain": self.chain }
            });

            let result = self
                .client
                .post(&url)
                .header("X-Dune-API-Key", &self.api_key)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(query_id, sale_id, "Analytics query refreshed");
                    record_relay_post("ok");
                }
                Ok(response) => {
                    warn!(query_id, sale_id, status = %response.status(), "⚠️  Analytics refresh rejected");
                    record_relay_post("rejected");
                }
                Err(e) => {
                    warn!(query_id, sale_id, error = %e, "⚠️  Analytics refresh failed");
                    record_relay_post("error");
                }
            }
        }
    }
}

/// Decorator delivering bids to the relay after the wrapped handler ran.
///
/// Wrapping happens here in the binary so the dispatcher and the sale
/// handlers stay free of outbound HTTP.
pub struct RelayTap {
    inner: Arc<dyn EventHandler>,
    relay: Arc<AnalyticsRelay>,
}

impl RelayTap {
    pub fn new(inner: Arc<dyn EventHandler>, relay: Arc<AnalyticsRelay>) -> Self {
        Self { inner, relay }
    }
}

#[async_trait]
impl EventHandler for RelayTap {
    fn template(&self) -> &'static str {
        self.inner.template()
    }

    async fn handle_event(
        &self,
        event: &EventEnvelope,
        ctx: &HandlerContext,
    ) -> DomainResult<()> {
        self.inner.handle_event(event, ctx).await?;

        if event.event == "Bid" {
            if let Some(sale_id) = sale_id_param(event) {
                let relay = Arc::clone(&self.relay);
                tokio::spawn(async move { relay.notify_bid(&sale_id).await });
            }
        }

        Ok(())
    }
}

/// Pull the sale id out of a bid payload, number or decimal string.
fn sale_id_param(event: &EventEnvelope) -> Option<String> {
    match event.params.get("saleId")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use enzyme_core::models::{Address, TxHash};

    fn bid(params: serde_json::Value) -> EventEnvelope {
        EventEnvelope {
            address: Address([0xaa; 20]),
            event: "Bid".into(),
            params,
            block_number: 100,
            block_timestamp: 1_700_000_100,
            tx_hash: TxHash([0x42; 32]),
            log_index: 0,
            tx_log_index: 0,
        }
    }

    #[test]
    fn sale_id_accepts_string_and_number() {
        assert_eq!(
            sale_id_param(&bid(serde_json::json!({"saleId": "7"}))),
            Some("7".into())
        );
        assert_eq!(
            sale_id_param(&bid(serde_json::json!({"saleId": 7}))),
            Some("7".into())
        );
        assert_eq!(sale_id_param(&bid(serde_json::json!({}))), None);
    }
}
