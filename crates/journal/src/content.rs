//! IPFS HTTP gateway adapter implementing the `ContentSource` port.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use enzyme_core::error::{ContentError, ContentResult};
use enzyme_core::ports::ContentSource;

/// Public gateway used when no override is configured.
pub const DEFAULT_GATEWAY: &str = "https://ipfs.io";

/// Per-fetch timeout. One attempt per fetch, no retry inside the adapter.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// IPFS HTTP gateway client.
pub struct IpfsGateway {
    client: reqwest::Client,
    base_url: String,
}

impl IpfsGateway {
    /// Build a gateway client against `base_url` (e.g., "https://ipfs.io").
    pub fn new(base_url: &str, timeout: Duration) -> ContentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContentError::Fetch(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, cid: &str) -> String {
        format!("{}/ipfs/{cid}", self.base_url)
    }
}

#[async_trait]
impl ContentSource for IpfsGateway {
    async fn fetch(&self, cid: &str) -> ContentResult<Vec<u8>> {
        let url = self.url_for(cid);
        debug!(%url, "Fetching content");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ContentError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ContentError::Unavailable(format!(
                "{cid}: HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ContentError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_gateway_urls_without_double_slashes() {
        let gateway = IpfsGateway::new("https://ipfs.io/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            gateway.url_for("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"),
            "https://ipfs.io/ipfs/QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"
        );
    }
}
