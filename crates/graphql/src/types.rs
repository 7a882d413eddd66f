//! GraphQL object types mirroring the projected entities.
//!
//! Addresses and hashes surface as 0x-prefixed hex strings, token amounts as
//! decimal strings (u256 quantities overflow GraphQL's Int). Reference fields
//! resolve to the related object through the entity store; the raw foreign
//! key stays available as the related object's `id`.

use std::sync::Arc;

use async_graphql::{
    ComplexObject, Context, EmptyMutation, EmptySubscription, Result, Schema, SimpleObject,
};

use enzyme_core::entities as core;
use enzyme_core::entities::Entity;
use enzyme_core::ports::{EntityStore, EntityStoreExt};

use crate::schema::{QueryRoot, page_first, page_skip};

/// The schema type served over HTTP.
pub type EnzymeSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

// =============================================================================
// Resolver Helpers
// =============================================================================

async fn load_related<E: Entity>(ctx: &Context<'_>, id: &str) -> Result<Option<E>> {
    let store = ctx.data::<Arc<dyn EntityStore>>()?;
    Ok(store.load::<E>(id).await?)
}

/// Id-ordered page of entities whose `field` references `value`.
pub(crate) async fn related_page<E: Entity>(
    ctx: &Context<'_>,
    field: &str,
    value: &str,
    first: Option<i32>,
    skip: Option<i32>,
) -> Result<Vec<E>> {
    let store = ctx.data::<Arc<dyn EntityStore>>()?;
    let docs = store
        .find_by(E::KIND, field, value, page_first(first), page_skip(skip))
        .await?;
    let mut entities = Vec::with_capacity(docs.len());
    for doc in docs {
        entities.push(
            serde_json::from_value(doc).map_err(|e| {
                async_graphql::Error::new(format!("Corrupt {} document: {e}", E::KIND))
            })?,
        );
    }
    Ok(entities)
}

// =============================================================================
// Tokens
// =============================================================================

/// ERC-20 metadata cache entry.
#[derive(SimpleObject)]
pub struct Token {
    pub id: String,
    pub decimals: u32,
    pub symbol: String,
    pub name: String,
    /// Address of the TimelockedToken wrapping this token, if any.
    pub locked_token: Option<String>,
}

impl From<core::Token> for Token {
    fn from(t: core::Token) -> Self {
        Self {
            id: t.id,
            decimals: t.decimals,
            symbol: t.symbol,
            name: t.name,
            locked_token: t.locked_token.map(|a| a.to_hex()),
        }
    }
}

/// Vesting wrapper token deployed per underlying token.
#[derive(SimpleObject)]
#[graphql(complex)]
pub struct TimelockedToken {
    pub id: String,
    pub decimals: u32,
    pub symbol: String,
    pub name: String,
    #[graphql(skip)]
    underlying_token_id: String,
}

#[ComplexObject]
impl TimelockedToken {
    /// The wrapped token.
    async fn underlying_token(&self, ctx: &Context<'_>) -> Result<Option<Token>> {
        Ok(load_related::<core::Token>(ctx, &self.underlying_token_id)
            .await?
            .map(Token::from))
    }

    /// Vesting schedules inside this contract.
    async fn schedules(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<LockedSchedule>> {
        let schedules =
            related_page::<core::LockedSchedule>(ctx, "tokenContract", &self.id, first, skip)
                .await?;
        Ok(schedules.into_iter().map(LockedSchedule::from).collect())
    }
}

impl From<core::TimelockedToken> for TimelockedToken {
    fn from(t: core::TimelockedToken) -> Self {
        Self {
            id: t.id,
            decimals: t.decimals,
            symbol: t.symbol,
            name: t.name,
            underlying_token_id: t.underlying_token.to_hex(),
        }
    }
}

// =============================================================================
// Crowd Sales
// =============================================================================

/// Sale lifecycle state.
#[derive(async_graphql::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaleState {
    Running,
    Settled,
    Failed,
    Unknown,
}

impl From<core::SaleState> for SaleState {
    fn from(s: core::SaleState) -> Self {
        match s {
            core::SaleState::Running => SaleState::Running,
            core::SaleState::Settled => SaleState::Settled,
            core::SaleState::Failed => SaleState::Failed,
            core::SaleState::Unknown => SaleState::Unknown,
        }
    }
}

/// Sale contract family.
#[derive(async_graphql::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaleType {
    Crowdsale,
    StakedLockingCrowdsale,
}

impl From<core::SaleType> for SaleType {
    fn from(s: core::SaleType) -> Self {
        match s {
            core::SaleType::Crowdsale => SaleType::Crowdsale,
            core::SaleType::StakedLockingCrowdsale => SaleType::StakedLockingCrowdsale,
        }
    }
}

/// One sale of fractionalized tokens against a bidding token.
#[derive(SimpleObject)]
#[graphql(complex)]
pub struct CrowdSale {
    pub id: String,
    pub sale_type: SaleType,
    pub issuer: String,
    pub beneficiary: String,
    pub funding_goal: String,
    pub sales_amount: String,
    pub amount_raised: String,
    pub amount_staked: String,
    pub closing_time: u64,
    pub state: SaleState,
    pub created_at: u64,
    pub claimed_at: Option<u64>,
    pub permissioner: Option<String>,
    pub fee_bp: Option<u32>,
    pub staking_duration: Option<u64>,
    pub auction_locking_duration: Option<u64>,
    pub wad_fixed_staked_per_bid_price: Option<String>,
    #[graphql(skip)]
    auction_token_id: String,
    #[graphql(skip)]
    bidding_token_id: String,
    #[graphql(skip)]
    staking_token_id: Option<String>,
    #[graphql(skip)]
    vested_staking_token_id: Option<String>,
}

#[ComplexObject]
impl CrowdSale {
    /// The auctioned (fractionalized) token.
    async fn auction_token(&self, ctx: &Context<'_>) -> Result<Option<Token>> {
        Ok(load_related::<core::Token>(ctx, &self.auction_token_id)
            .await?
            .map(Token::from))
    }

    /// The token bids are paid in.
    async fn bidding_token(&self, ctx: &Context<'_>) -> Result<Option<Token>> {
        Ok(load_related::<core::Token>(ctx, &self.bidding_token_id)
            .await?
            .map(Token::from))
    }

    /// The staked token (staked/locking variant only).
    async fn staking_token(&self, ctx: &Context<'_>) -> Result<Option<Token>> {
        match &self.staking_token_id {
            Some(id) => Ok(load_related::<core::Token>(ctx, id).await?.map(Token::from)),
            None => Ok(None),
        }
    }

    /// The vesting wrapper refunded stakes vest in (staked/locking variant only).
    async fn vested_staking_token(&self, ctx: &Context<'_>) -> Result<Option<TimelockedToken>> {
        match &self.vested_staking_token_id {
            Some(id) => Ok(load_related::<core::TimelockedToken>(ctx, id)
                .await?
                .map(TimelockedToken::from)),
            None => Ok(None),
        }
    }

    /// Per-bidder contributions to this sale.
    async fn contributions(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Contribution>> {
        let contributions =
            related_page::<core::Contribution>(ctx, "crowdSale", &self.id, first, skip).await?;
        Ok(contributions.into_iter().map(Contribution::from).collect())
    }
}

impl From<core::CrowdSale> for CrowdSale {
    fn from(s: core::CrowdSale) -> Self {
        Self {
            id: s.id,
            sale_type: s.sale_type.into(),
            issuer: s.issuer.to_hex(),
            beneficiary: s.beneficiary.to_hex(),
            funding_goal: s.funding_goal.0.to_string(),
            sales_amount: s.sales_amount.0.to_string(),
            amount_raised: s.amount_raised.0.to_string(),
            amount_staked: s.amount_staked.0.to_string(),
            closing_time: s.closing_time,
            state: s.state.into(),
            created_at: s.created_at,
            claimed_at: s.claimed_at,
            permissioner: s.permissioner.map(|a| a.to_hex()),
            fee_bp: s.fee_bp,
            staking_duration: s.staking_duration,
            auction_locking_duration: s.auction_locking_duration,
            wad_fixed_staked_per_bid_price: s
                .wad_fixed_staked_per_bid_price
                .map(|a| a.0.to_string()),
            auction_token_id: s.auction_token.to_hex(),
            bidding_token_id: s.bidding_token.to_hex(),
            staking_token_id: s.staking_token.map(|a| a.to_hex()),
            vested_staking_token_id: s.vested_staking_token.map(|a| a.to_hex()),
        }
    }
}

/// Cumulative participation of one bidder in one sale.
#[derive(SimpleObject)]
#[graphql(complex)]
pub struct Contribution {
    pub id: String,
    pub contributor: String,
    pub amount: String,
    pub staked_amount: String,
    pub price: Option<String>,
    pub created_at: u64,
    pub claimed_at: Option<u64>,
    pub claimed_tx: Option<String>,
    pub claimed_tokens: Option<String>,
    pub refunded_tokens: Option<String>,
    pub claimed_stakes: Option<String>,
    pub refunded_stakes: Option<String>,
    #[graphql(skip)]
    crowd_sale_id: String,
}

#[ComplexObject]
impl Contribution {
    /// The sale this contribution belongs to.
    async fn crowd_sale(&self, ctx: &Context<'_>) -> Result<Option<CrowdSale>> {
        Ok(load_related::<core::CrowdSale>(ctx, &self.crowd_sale_id)
            .await?
            .map(CrowdSale::from))
    }
}

impl From<core::Contribution> for Contribution {
    fn from(c: core::Contribution) -> Self {
        Self {
            id: c.id,
            contributor: c.contributor.to_hex(),
            amount: c.amount.0.to_string(),
            staked_amount: c.staked_amount.0.to_string(),
            price: c.price.map(|a| a.0.to_string()),
            created_at: c.created_at,
            claimed_at: c.claimed_at,
            claimed_tx: c.claimed_tx.map(|h| h.to_hex()),
            claimed_tokens: c.claimed_tokens.map(|a| a.0.to_string()),
            refunded_tokens: c.refunded_tokens.map(|a| a.0.to_string()),
            claimed_stakes: c.claimed_stakes.map(|a| a.0.to_string()),
            refunded_stakes: c.refunded_stakes.map(|a| a.0.to_string()),
            crowd_sale_id: c.crowd_sale,
        }
    }
}

// =============================================================================
// IP-NFTs
// =============================================================================

/// One minted IP-NFT.
#[derive(SimpleObject)]
#[graphql(complex)]
pub struct Ipnft {
    pub id: String,
    pub owner: String,
    pub token_uri: String,
    pub symbol: Option<String>,
    pub created_at: u64,
    #[graphql(skip)]
    metadata_cid: Option<String>,
}

#[ComplexObject]
impl Ipnft {
    /// The ingested off-chain metadata document, when available.
    async fn metadata(&self, ctx: &Context<'_>) -> Result<Option<IpnftMetadata>> {
        match &self.metadata_cid {
            Some(cid) => Ok(load_related::<core::IpnftMetadata>(ctx, cid)
                .await?
                .map(IpnftMetadata::from)),
            None => Ok(None),
        }
    }
}

impl From<core::Ipnft> for Ipnft {
    fn from(i: core::Ipnft) -> Self {
        Self {
            id: i.id,
            owner: i.owner.to_hex(),
            token_uri: i.token_uri,
            symbol: i.symbol,
            created_at: i.created_at,
            metadata_cid: i.metadata,
        }
    }
}

/// Token id claimed but not yet minted.
#[derive(SimpleObject)]
pub struct Reservation {
    pub id: String,
    pub owner: String,
    pub uri: Option<String>,
    pub created_at: u64,
}

impl From<core::Reservation> for Reservation {
    fn from(r: core::Reservation) -> Self {
        Self {
            id: r.id,
            owner: r.owner.to_hex(),
            uri: r.uri,
            created_at: r.created_at,
        }
    }
}

/// Fields extracted from an IP-NFT's metadata document.
#[derive(SimpleObject)]
pub struct IpnftMetadata {
    pub id: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub external_url: Option<String>,
    pub organization: Option<String>,
    pub topic: Option<String>,
    pub funding_amount_value: Option<f64>,
    pub funding_amount_currency: Option<String>,
    pub research_lead_name: Option<String>,
    pub research_lead_email: Option<String>,
}

impl From<core::IpnftMetadata> for IpnftMetadata {
    fn from(m: core::IpnftMetadata) -> Self {
        Self {
            id: m.id,
            name: m.name,
            image: m.image,
            description: m.description,
            external_url: m.external_url,
            organization: m.organization,
            topic: m.topic,
            funding_amount_value: m.funding_amount_value,
            funding_amount_currency: m.funding_amount_currency,
            research_lead_name: m.research_lead_name,
            research_lead_email: m.research_lead_email,
        }
    }
}

// =============================================================================
// Fractionalized Claim Tokens
// =============================================================================

/// Parent aggregate of a claim token derived from an IP-NFT.
#[derive(SimpleObject)]
#[graphql(complex)]
pub struct Fractionalized {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub original_owner: String,
    pub agreement_cid: String,
    pub total_issued: String,
    pub circulating_supply: String,
    pub capped: bool,
    pub created_at: u64,
    #[graphql(skip)]
    ipnft_id: String,
}

#[ComplexObject]
impl Fractionalized {
    /// The source IP-NFT.
    async fn ipnft(&self, ctx: &Context<'_>) -> Result<Option<Ipnft>> {
        Ok(load_related::<core::Ipnft>(ctx, &self.ipnft_id)
            .await?
            .map(Ipnft::from))
    }

    /// Per-holder balances of this token.
    async fn fractions(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Fraction>> {
        let fractions =
            related_page::<core::Fraction>(ctx, "fractionalized", &self.id, first, skip).await?;
        Ok(fractions.into_iter().map(Fraction::from).collect())
    }
}

impl From<core::Fractionalized> for Fractionalized {
    fn from(f: core::Fractionalized) -> Self {
        Self {
            id: f.id,
            name: f.name,
            symbol: f.symbol,
            decimals: f.decimals,
            original_owner: f.original_owner.to_hex(),
            agreement_cid: f.agreement_cid,
            total_issued: f.total_issued.0.to_string(),
            circulating_supply: f.circulating_supply.0.to_string(),
            capped: f.capped,
            created_at: f.created_at,
            ipnft_id: f.ipnft,
        }
    }
}

/// Per-holder balance of one fractionalized token.
#[derive(SimpleObject)]
pub struct Fraction {
    pub id: String,
    pub owner: String,
    pub balance: String,
    pub agreement_signature: Option<String>,
}

impl From<core::Fraction> for Fraction {
    fn from(f: core::Fraction) -> Self {
        Self {
            id: f.id,
            owner: f.owner.to_hex(),
            balance: f.balance.0.to_string(),
            agreement_signature: f.agreement_signature,
        }
    }
}

// =============================================================================
// Mintpasses
// =============================================================================

/// Mintpass redemption status.
#[derive(async_graphql::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MintpassStatus {
    Default,
    Redeemed,
    Revoked,
}

impl From<core::MintpassStatus> for MintpassStatus {
    fn from(s: core::MintpassStatus) -> Self {
        match s {
            core::MintpassStatus::Default => MintpassStatus::Default,
            core::MintpassStatus::Redeemed => MintpassStatus::Redeemed,
            core::MintpassStatus::Revoked => MintpassStatus::Revoked,
        }
    }
}

/// Soulbound pass authorizing one IP-NFT mint.
#[derive(SimpleObject)]
pub struct Mintpass {
    pub id: String,
    pub owner: String,
    pub status: MintpassStatus,
    pub created_at: u64,
}

impl From<core::Mintpass> for Mintpass {
    fn from(m: core::Mintpass) -> Self {
        Self {
            id: m.id,
            owner: m.owner.to_hex(),
            status: m.status.into(),
            created_at: m.created_at,
        }
    }
}

// =============================================================================
// Vesting Schedules
// =============================================================================

/// One vesting schedule inside a TimelockedToken contract.
#[derive(SimpleObject)]
#[graphql(complex)]
pub struct LockedSchedule {
    pub id: String,
    pub beneficiary: String,
    pub amount: String,
    pub expires_at: u64,
    pub claimed_at: Option<u64>,
    #[graphql(skip)]
    token_contract_id: String,
}

#[ComplexObject]
impl LockedSchedule {
    /// The vesting contract holding this schedule.
    async fn token_contract(&self, ctx: &Context<'_>) -> Result<Option<TimelockedToken>> {
        Ok(
            load_related::<core::TimelockedToken>(ctx, &self.token_contract_id)
                .await?
                .map(TimelockedToken::from),
        )
    }
}

impl From<core::LockedSchedule> for LockedSchedule {
    fn from(s: core::LockedSchedule) -> Self {
        Self {
            id: s.id,
            beneficiary: s.beneficiary.to_hex(),
            amount: s.amount.0.to_string(),
            expires_at: s.expires_at,
            claimed_at: s.claimed_at,
            token_contract_id: s.token_contract.to_hex(),
        }
    }
}

// =============================================================================
// Marketplace
// =============================================================================

/// One marketplace listing of an IP-NFT.
#[derive(SimpleObject)]
#[graphql(complex)]
pub struct Listing {
    pub id: String,
    pub creator: String,
    pub payment_token: String,
    pub ask_price: String,
    pub created_at: u64,
    pub unlisted_at: Option<u64>,
    pub purchased_at: Option<u64>,
    pub buyer: Option<String>,
    #[graphql(skip)]
    ipnft_id: Option<String>,
}

#[ComplexObject]
impl Listing {
    /// The listed IP-NFT; null when the token was never indexed.
    async fn ipnft(&self, ctx: &Context<'_>) -> Result<Option<Ipnft>> {
        match &self.ipnft_id {
            Some(id) => Ok(load_related::<core::Ipnft>(ctx, id).await?.map(Ipnft::from)),
            None => Ok(None),
        }
    }

    /// Buyers allowed to purchase this listing.
    async fn allowlist(
        &self,
        ctx: &Context<'_>,
        first: Option<i32>,
        skip: Option<i32>,
    ) -> Result<Vec<Allowed>> {
        let allowed = related_page::<core::Allowed>(ctx, "listing", &self.id, first, skip).await?;
        Ok(allowed.into_iter().map(Allowed::from).collect())
    }
}

impl From<core::Listing> for Listing {
    fn from(l: core::Listing) -> Self {
        Self {
            id: l.id,
            creator: l.creator.to_hex(),
            payment_token: l.payment_token.to_hex(),
            ask_price: l.ask_price.0.to_string(),
            created_at: l.created_at,
            unlisted_at: l.unlisted_at,
            purchased_at: l.purchased_at,
            buyer: l.buyer.map(|a| a.to_hex()),
            ipnft_id: l.ipnft,
        }
    }
}

/// Allowlist membership for one listing.
#[derive(SimpleObject)]
pub struct Allowed {
    pub id: String,
    pub buyer: String,
}

impl From<core::Allowed> for Allowed {
    fn from(a: core::Allowed) -> Self {
        Self {
            id: a.id,
            buyer: a.buyer.to_hex(),
        }
    }
}
