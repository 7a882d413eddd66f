//! Shared projection helpers used across handler families.

use enzyme_core::entities::{DataSourceRecord, TimelockedToken, Token};
use enzyme_core::error::DomainResult;
use enzyme_core::metrics::{
    record_data_source_created, record_integrity_violation, record_missing_entity,
};
use enzyme_core::models::Address;
use enzyme_core::ports::{EntityStoreExt, HandlerContext};
use enzyme_core::sources::SourceContext;
use tracing::{debug, warn};

/// Make sure a Token document exists for `address`, creating it from the
/// token directory on first reference. A directory miss writes nothing and
/// returns `None`; the caller decides whether that blocks its projection.
pub async fn ensure_token(ctx: &HandlerContext, address: &Address) -> DomainResult<Option<Token>> {
    let id = Token::id_for(address);
    if let Some(existing) = ctx.store.load::<Token>(&id).await? {
        return Ok(Some(existing));
    }

    let Some(record) = ctx.tokens.metadata(address) else {
        warn!(%address, "token metadata unavailable, no document written");
        record_missing_entity("Token");
        return Ok(None);
    };

    let token = Token {
        id,
        decimals: record.decimals,
        symbol: record.symbol,
        name: record.name,
        locked_token: None,
    };
    ctx.store.save(&token).await?;
    Ok(Some(token))
}

/// Create the TimelockedToken document for a locking contract and back-link
/// it from its underlying token.
///
/// The back-link is write-once: a later event naming a different locking
/// contract for the same underlying token is recorded as an integrity
/// violation and the first link kept.
pub async fn make_timelocked_token(
    ctx: &HandlerContext,
    locking: &Address,
    underlying: &Address,
) -> DomainResult<()> {
    let Some(mut token) = ensure_token(ctx, underlying).await? else {
        warn!(
            %locking,
            %underlying,
            "underlying token unresolvable, locking contract not projected"
        );
        return Ok(());
    };

    let id = TimelockedToken::id_for(locking);
    if ctx.store.load::<TimelockedToken>(&id).await?.is_none() {
        let timelocked = match ctx.tokens.metadata(locking) {
            Some(record) => TimelockedToken {
                id,
                decimals: record.decimals,
                symbol: record.symbol,
                name: record.name,
                underlying_token: *underlying,
            },
            None => {
                // The wrapper proxies its underlying token.
                warn!(
                    %locking,
                    "locking contract metadata unavailable, mirroring the underlying token"
                );
                TimelockedToken {
                    id,
                    decimals: token.decimals,
                    symbol: token.symbol.clone(),
                    name: token.name.clone(),
                    underlying_token: *underlying,
                }
            }
        };
        ctx.store.save(&timelocked).await?;
    }

    match token.locked_token {
        None => {
            token.locked_token = Some(*locking);
            ctx.store.save(&token).await?;
        }
        Some(existing) if existing == *locking => {}
        Some(existing) => {
            warn!(
                token = %underlying,
                kept = %existing,
                rejected = %locking,
                "conflicting locking-contract link, keeping first writer"
            );
            record_integrity_violation("Token");
        }
    }
    Ok(())
}

/// Register a dynamic data source and mirror it to the store so a restart
/// restores delivery. Idempotent per address.
pub async fn spawn_data_source(
    ctx: &HandlerContext,
    template: &str,
    address: Address,
    context: SourceContext,
    created_at_block: u64,
) -> DomainResult<()> {
    if !ctx
        .sources
        .create(template, address, context.clone(), created_at_block)
    {
        debug!(%address, template, "data source already exists, nothing to persist");
        return Ok(());
    }

    record_data_source_created(template);
    ctx.store
        .save(&DataSourceRecord {
            id: address.to_hex(),
            template: template.to_string(),
            context,
            created_at_block,
        })
        .await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use enzyme_core::ports::{EntityStoreExt, StaticContent, StaticTokens};

    #[tokio::test]
    async fn ensure_token_uses_directory_then_caches() {
        let tokens = StaticTokens::new().with(token_record(addr(0x01), "USDC", "USD Coin"));
        let h = harness_with(tokens, StaticContent::new());

        let token = ensure_token(&h.ctx, &addr(0x01)).await.unwrap().unwrap();
        assert_eq!(token.symbol, "USDC");

        // Deuxième référence: pas de nouvelle écriture, même document
        let again = ensure_token(&h.ctx, &addr(0x01)).await.unwrap().unwrap();
        assert_eq!(again, token);
    }

    // Test critique: un trou dans l'annuaire ne doit produire aucun document,
    // jamais un Token de substitution
    #[tokio::test]
    async fn ensure_token_directory_miss_writes_nothing() {
        let h = harness();
        assert!(ensure_token(&h.ctx, &addr(0x02)).await.unwrap().is_none());
        assert_eq!(
            count(&h.store, enzyme_core::entities::EntityKind::Token).await,
            0
        );
    }

    // Test critique: le lien lockedToken est write-once, premier écrivain gagne
    #[tokio::test]
    async fn locking_link_keeps_first_writer() {
        let underlying = addr(0x10);
        let tokens = StaticTokens::new().with(token_record(underlying, "IPT", "IP Token"));
        let h = harness_with(tokens, StaticContent::new());

        make_timelocked_token(&h.ctx, &addr(0x20), &underlying)
            .await
            .unwrap();
        make_timelocked_token(&h.ctx, &addr(0x30), &underlying)
            .await
            .unwrap();

        let token = h
            .ctx
            .store
            .load::<Token>(&Token::id_for(&underlying))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.locked_token, Some(addr(0x20)));
    }

    #[tokio::test]
    async fn spawn_data_source_persists_once() {
        let h = harness();
        let address = addr(0x55);
        let context = SourceContext::new().with_address("ipt", addr(0x10));

        spawn_data_source(&h.ctx, "TimelockedToken", address, context.clone(), 100)
            .await
            .unwrap();
        spawn_data_source(&h.ctx, "TimelockedToken", address, context, 101)
            .await
            .unwrap();

        assert!(h.ctx.sources.contains(&address));
        let record = h
            .ctx
            .store
            .load::<DataSourceRecord>(&address.to_hex())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.created_at_block, 100);
    }
}
