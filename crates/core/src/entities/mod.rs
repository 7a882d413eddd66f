//! Projected domain entities.
//!
//! One canonical schema for the whole platform: tokens, crowd sales and
//! contributions, IP-NFTs and reservations, fractionalized claim tokens and
//! per-holder balances, mintpasses, vesting schedules, marketplace listings
//! and off-chain metadata.
//!
//! Entities are mutable JSON documents keyed by [`EntityKind`] plus a stable
//! string id derived from on-chain identifiers (token id, contract address
//! hex, composite `saleId-0xbidder`). Documents are written whole: there is
//! no partial update, callers read-modify-write through the store.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::models::{Address, Amount, SignedAmount, TxHash};
use crate::sources::SourceContext;

// =============================================================================
// Entity Kinds
// =============================================================================

/// Discriminator for every document family the store can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Token,
    TimelockedToken,
    CrowdSale,
    Contribution,
    Ipnft,
    Reservation,
    Fractionalized,
    Fraction,
    Mintpass,
    LockedSchedule,
    Listing,
    Allowed,
    IpnftMetadata,
    DataSource,
}

impl EntityKind {
    /// Every kind, in stable order (used for purges and status counts).
    pub const ALL: &'static [EntityKind] = &[
        EntityKind::Token,
        EntityKind::TimelockedToken,
        EntityKind::CrowdSale,
        EntityKind::Contribution,
        EntityKind::Ipnft,
        EntityKind::Reservation,
        EntityKind::Fractionalized,
        EntityKind::Fraction,
        EntityKind::Mintpass,
        EntityKind::LockedSchedule,
        EntityKind::Listing,
        EntityKind::Allowed,
        EntityKind::IpnftMetadata,
        EntityKind::DataSource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Token => "Token",
            EntityKind::TimelockedToken => "TimelockedToken",
            EntityKind::CrowdSale => "CrowdSale",
            EntityKind::Contribution => "Contribution",
            EntityKind::Ipnft => "Ipnft",
            EntityKind::Reservation => "Reservation",
            EntityKind::Fractionalized => "Fractionalized",
            EntityKind::Fraction => "Fraction",
            EntityKind::Mintpass => "Mintpass",
            EntityKind::LockedSchedule => "LockedSchedule",
            EntityKind::Listing => "Listing",
            EntityKind::Allowed => "Allowed",
            EntityKind::IpnftMetadata => "IpnftMetadata",
            EntityKind::DataSource => "DataSource",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed document the store can load and save.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const KIND: EntityKind;

    /// Stable identifier within this entity's kind.
    fn id(&self) -> &str;
}

macro_rules! impl_entity {
    ($type:ty, $kind:ident) => {
        impl Entity for $type {
            const KIND: EntityKind = EntityKind::$kind;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

// =============================================================================
// Tokens
// =============================================================================

/// ERC-20 metadata cache.
///
/// Created lazily on first reference; name/symbol/decimals are assumed
/// immutable for a given contract and never updated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Contract address hex.
    pub id: String,
    pub decimals: u32,
    pub symbol: String,
    pub name: String,
    /// 1:1 back-reference to the TimelockedToken wrapping this token.
    /// First writer wins; a conflicting rebind is an integrity violation.
    pub locked_token: Option<Address>,
}

impl Token {
    pub fn id_for(address: &Address) -> String {
        address.to_hex()
    }
}

impl_entity!(Token, Token);

/// Vesting wrapper deployed per underlying token by the locking factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelockedToken {
    /// Locking-contract address hex.
    pub id: String,
    pub decimals: u32,
    pub symbol: String,
    pub name: String,
    pub underlying_token: Address,
}

impl TimelockedToken {
    pub fn id_for(address: &Address) -> String {
        address.to_hex()
    }
}

impl_entity!(TimelockedToken, TimelockedToken);

// =============================================================================
// Crowd Sales
// =============================================================================

/// Sale lifecycle. Transitions are one-directional:
/// RUNNING -> SETTLED or RUNNING -> FAILED, never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleState {
    Running,
    Settled,
    Failed,
    Unknown,
}

impl SaleState {
    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleState::Settled | SaleState::Failed)
    }
}

/// Which sale contract family emitted the sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleType {
    Crowdsale,
    StakedLockingCrowdsale,
}

/// One sale of fractionalized tokens against a bidding token.
///
/// `amountRaised`/`amountStaked` are running totals, monotonically
/// non-decreasing via additive updates. Exactly one CrowdSale exists per
/// sale id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrowdSale {
    /// Sale id (decimal string).
    pub id: String,
    pub sale_type: SaleType,
    pub issuer: Address,
    pub beneficiary: Address,
    /// Token entity id of the auctioned (fractionalized) token.
    pub auction_token: Address,
    /// Token entity id of the token bids are paid in.
    pub bidding_token: Address,
    pub funding_goal: Amount,
    pub sales_amount: Amount,
    pub amount_raised: Amount,
    pub amount_staked: Amount,
    /// Sale close (unix seconds).
    pub closing_time: u64,
    pub state: SaleState,
    pub created_at: u64,
    /// Issuer's terminal claim (unix seconds), set by
    /// ClaimedFundingGoal/ClaimedAuctionTokens.
    pub claimed_at: Option<u64>,
    pub permissioner: Option<Address>,
    pub fee_bp: Option<u32>,
    // Staked/locking variant only.
    pub staking_token: Option<Address>,
    pub vested_staking_token: Option<Address>,
    pub staking_duration: Option<u64>,
    pub auction_locking_duration: Option<u64>,
    pub wad_fixed_staked_per_bid_price: Option<Amount>,
}

impl_entity!(CrowdSale, CrowdSale);

/// Cumulative participation of one bidder in one sale.
///
/// At most one Contribution exists per (sale, bidder); `amount` accumulates
/// across repeated bids. Claim fields are write-once per claim type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    /// Composite id `saleId-0xbidder`.
    pub id: String,
    /// Owning sale id.
    pub crowd_sale: String,
    pub contributor: Address,
    pub amount: Amount,
    pub staked_amount: Amount,
    /// Staked-per-bid price captured from the first Staked event.
    pub price: Option<Amount>,
    pub created_at: u64,
    pub claimed_at: Option<u64>,
    pub claimed_tx: Option<TxHash>,
    pub claimed_tokens: Option<Amount>,
    pub refunded_tokens: Option<Amount>,
    pub claimed_stakes: Option<Amount>,
    pub refunded_stakes: Option<Amount>,
}

impl Contribution {
    pub fn id_for(sale_id: &str, bidder: &Address) -> String {
        format!("{}-{}", sale_id, bidder.to_hex())
    }
}

impl_entity!(Contribution, Contribution);

// =============================================================================
// IP-NFTs
// =============================================================================

/// One minted IP-NFT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ipnft {
    /// Token id (decimal string).
    pub id: String,
    pub owner: Address,
    pub token_uri: String,
    pub symbol: Option<String>,
    /// Content id of the ingested metadata document, when the token URI
    /// points into the content-addressed store.
    pub metadata: Option<String>,
    pub created_at: u64,
}

impl_entity!(Ipnft, Ipnft);

/// Placeholder for a token id claimed but not yet minted.
/// Removed when the corresponding mint fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Reservation id (same id space as the future token id).
    pub id: String,
    pub owner: Address,
    pub uri: Option<String>,
    pub created_at: u64,
}

impl_entity!(Reservation, Reservation);

// =============================================================================
// Fractionalized Claim Tokens
// =============================================================================

/// Parent aggregate of a claim token derived from an IP-NFT.
///
/// `circulatingSupply` equals the sum of all positive Fraction balances;
/// `totalIssued` only ever increases (burns reduce circulating, not issued).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fractionalized {
    /// Claim-token contract address hex.
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    /// Source IP-NFT token id.
    pub ipnft: String,
    pub original_owner: Address,
    /// Content id of the off-chain fractionalization agreement.
    pub agreement_cid: String,
    pub total_issued: Amount,
    pub circulating_supply: Amount,
    pub capped: bool,
    pub created_at: u64,
}

impl Fractionalized {
    pub fn id_for(address: &Address) -> String {
        address.to_hex()
    }
}

impl_entity!(Fractionalized, Fractionalized);

/// Per-holder balance of one fractionalized token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fraction {
    /// Composite id `parentId-0xowner`.
    pub id: String,
    /// Owning Fractionalized id.
    pub fractionalized: String,
    pub owner: Address,
    pub balance: SignedAmount,
    /// Hex signature recorded when the holder accepts the agreement terms.
    pub agreement_signature: Option<String>,
}

impl Fraction {
    pub fn id_for(parent_id: &str, owner: &Address) -> String {
        format!("{}-{}", parent_id, owner.to_hex())
    }
}

impl_entity!(Fraction, Fraction);

// =============================================================================
// Mintpasses
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MintpassStatus {
    Default,
    Redeemed,
    Revoked,
}

/// Soulbound pass authorizing one IP-NFT mint.
/// Created on mint, deleted on burn; wallet-to-wallet transfers don't exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mintpass {
    /// Token id (decimal string).
    pub id: String,
    pub owner: Address,
    pub status: MintpassStatus,
    pub created_at: u64,
}

impl_entity!(Mintpass, Mintpass);

// =============================================================================
// Vesting Schedules
// =============================================================================

/// One vesting schedule inside a TimelockedToken contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedSchedule {
    /// Schedule id (bytes32 hex).
    pub id: String,
    /// Owning TimelockedToken id, taken from the data-source context
    /// (the schedule events carry no contract back-reference).
    pub token_contract: Address,
    pub beneficiary: Address,
    pub amount: Amount,
    /// Unlock time (unix seconds).
    pub expires_at: u64,
    /// Release time (unix seconds), null until released.
    pub claimed_at: Option<u64>,
}

impl_entity!(LockedSchedule, LockedSchedule);

// =============================================================================
// Marketplace
// =============================================================================

/// One marketplace listing of an IP-NFT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Listing id (decimal string).
    pub id: String,
    pub creator: Address,
    /// Referenced Ipnft id; None when the token was never indexed.
    pub ipnft: Option<String>,
    pub payment_token: Address,
    pub ask_price: Amount,
    pub created_at: u64,
    pub unlisted_at: Option<u64>,
    pub purchased_at: Option<u64>,
    pub buyer: Option<Address>,
}

impl_entity!(Listing, Listing);

/// Allowlist membership for one listing, keyed `listingId-0xbuyer`.
/// Present means allowed; disallowing removes the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowed {
    pub id: String,
    /// Owning listing id.
    pub listing: String,
    pub buyer: Address,
}

impl Allowed {
    pub fn id_for(listing_id: &str, buyer: &Address) -> String {
        format!("{}-{}", listing_id, buyer.to_hex())
    }
}

impl_entity!(Allowed, Allowed);

// =============================================================================
// Off-chain Metadata
// =============================================================================

/// Fields extracted from an IP-NFT's content-addressed metadata document.
/// Every field is optional: absence is tolerated, never fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpnftMetadata {
    /// Content id the document was fetched from.
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

impl_entity!(IpnftMetadata, IpnftMetadata);

// =============================================================================
// Dynamic Data-Source Records
// =============================================================================

/// Persisted dynamic data-source registration.
///
/// Mirrors the in-memory registry so a restart restores delivery for
/// contracts that were registered at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceRecord {
    /// Watched contract address hex.
    pub id: String,
    /// Handler template the contract's events route to.
    pub template: String,
    /// Immutable context attached at creation.
    pub context: SourceContext,
    pub created_at_block: u64,
}

impl_entity!(DataSourceRecord, DataSource);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn contribution_id_is_sale_dash_bidder_hex() {
        let bidder = addr(0xb1);
        assert_eq!(
            Contribution::id_for("1", &bidder),
            "1-0xb1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1b1"
        );
    }

    #[test]
    fn fraction_id_is_parent_dash_owner_hex() {
        let parent = Fractionalized::id_for(&addr(0xcc));
        let id = Fraction::id_for(&parent, &addr(0xaa));
        assert_eq!(
            id,
            "0xcccccccccccccccccccccccccccccccccccccccc-0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
    }

    #[test]
    fn sale_state_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&SaleState::Running).unwrap(),
            "\"RUNNING\""
        );
        assert_eq!(
            serde_json::to_string(&SaleType::StakedLockingCrowdsale).unwrap(),
            "\"STAKED_LOCKING_CROWDSALE\""
        );
    }

    #[test]
    fn terminal_states() {
        assert!(!SaleState::Running.is_terminal());
        assert!(SaleState::Settled.is_terminal());
        assert!(SaleState::Failed.is_terminal());
    }

    // Test critique: les documents sont en camelCase, c'est le schéma public
    #[test]
    fn documents_are_camel_case() {
        let token = Token {
            id: Token::id_for(&addr(0x01)),
            decimals: 18,
            symbol: "IPT".into(),
            name: "IP Token".into(),
            locked_token: None,
        };
        let doc = serde_json::to_value(&token).unwrap();
        assert!(doc.get("lockedToken").is_some());

        let fraction = Fraction {
            id: "x-y".into(),
            fractionalized: "x".into(),
            owner: addr(0x02),
            balance: SignedAmount(10),
            agreement_signature: None,
        };
        let doc = serde_json::to_value(&fraction).unwrap();
        assert!(doc.get("agreementSignature").is_some());
        assert_eq!(doc.get("balance").unwrap(), "10");
    }

    #[test]
    fn entity_kinds_expose_stable_names() {
        assert_eq!(EntityKind::CrowdSale.as_str(), "CrowdSale");
        assert_eq!(EntityKind::ALL.len(), 14);
    }
}
