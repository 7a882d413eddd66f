//! Content-addressed metadata ingestion.
//!
//! IP-NFT token URIs usually point into the content-addressed store. When
//! they do, the document is fetched once at mint time and a flat
//! [`IpnftMetadata`] projection extracted from it. Every failure mode
//! (unresolvable cid, malformed JSON, missing fields) degrades to "no
//! metadata" and never fails the mint projection.

use enzyme_core::entities::IpnftMetadata;
use enzyme_core::error::DomainResult;
use enzyme_core::metrics::{record_metadata_error, record_metadata_ingested};
use enzyme_core::ports::{EntityStoreExt, HandlerContext};
use tracing::warn;

/// Extract a content id from a token URI.
///
/// Recognizes `ipfs://<cid>` and gateway-style `.../ipfs/<cid>` paths.
pub fn extract_cid(uri: &str) -> Option<String> {
    if let Some(cid) = uri.strip_prefix("ipfs://") {
        let cid = cid.trim_start_matches('/');
        return (!cid.is_empty()).then(|| cid.to_string());
    }
    if let Some(pos) = uri.find("/ipfs/") {
        let cid = &uri[pos + "/ipfs/".len()..];
        return (!cid.is_empty()).then(|| cid.to_string());
    }
    None
}

/// Parse a fetched metadata document into its flat projection.
///
/// The document must be non-empty and start with `{` or `[` (the upstream
/// store happily serves HTML error pages as 200s). Unknown fields are
/// ignored; known fields are all optional.
pub fn parse_document(cid: &str, bytes: &[u8]) -> Result<IpnftMetadata, String> {
    let first = bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .ok_or_else(|| "empty document".to_string())?;
    if *first != b'{' && *first != b'[' {
        return Err("document is not JSON".to_string());
    }

    let doc: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| format!("malformed JSON: {e}"))?;

    let text = |v: &serde_json::Value| v.as_str().map(str::to_string);
    let properties = doc.get("properties");
    let prop = |key: &str| properties.and_then(|p| p.get(key)).cloned();

    Ok(IpnftMetadata {
        id: cid.to_string(),
        name: doc.get("name").and_then(|v| text(v)),
        image: doc.get("image").and_then(|v| text(v)),
        description: doc.get("description").and_then(|v| text(v)),
        external_url: doc.get("external_url").and_then(|v| text(v)),
        organization: prop("organization").as_ref().and_then(text),
        topic: prop("topic").as_ref().and_then(text),
        funding_amount_value: prop("funding_amount")
            .and_then(|f| f.get("value").and_then(|v| v.as_f64())),
        funding_amount_currency: prop("funding_amount")
            .and_then(|f| f.get("currency").and_then(|v| text(v))),
        research_lead_name: prop("research_lead")
            .and_then(|r| r.get("name").and_then(|v| text(v))),
        research_lead_email: prop("research_lead")
            .and_then(|r| r.get("email").and_then(|v| text(v))),
    })
}

/// Fetch, parse and store the metadata document behind a token URI.
///
/// Returns the stored content id, or `None` when the URI is not
/// content-addressed or ingestion failed.
pub async fn ingest(ctx: &HandlerContext, token_uri: &str) -> DomainResult<Option<String>> {
    let Some(cid) = extract_cid(token_uri) else {
        return Ok(None);
    };

    let bytes = match ctx.content.fetch(&cid).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(cid = %cid, error = %e, "metadata fetch failed");
            record_metadata_error();
            return Ok(None);
        }
    };

    match parse_document(&cid, &bytes) {
        Ok(metadata) => {
            ctx.store.save(&metadata).await?;
            record_metadata_ingested();
            Ok(Some(cid))
        }
        Err(reason) => {
            warn!(cid = %cid, reason = %reason, "metadata document rejected");
            record_metadata_error();
            Ok(None)
        }
    }
}
