//! Domain models representing the decoded ledger input.
//!
//! These models are storage-agnostic: they describe what the dispatcher
//! consumes (event envelopes grouped per block) and the progress cursor,
//! not the projected entities (see [`crate::entities`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Fixed-size Byte Types
// =============================================================================

/// Macro to generate fixed-size byte newtypes with common functionality.
///
/// Generates:
/// - `from_hex()` - Parse from hex string (with or without 0x prefix)
/// - `to_hex()` - Convert to 0x-prefixed lowercase hex string
/// - `Display` trait implementation
/// - `From<[u8; N]>` implementation
/// - Hex-string serde (entity documents keep addresses human-readable)
macro_rules! bytes_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// All-zero value (the mint/burn sentinel address on EVM chains).
            pub const ZERO: Self = Self([0u8; $len]);

            /// Parse from hex string (with or without 0x prefix).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to 0x-prefixed lowercase hex string.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Get the inner bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// True for the all-zero value.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

bytes_newtype!(
    /// 20-byte contract or wallet address.
    Address,
    20
);

bytes_newtype!(
    /// 32-byte transaction hash (Keccak-256).
    TxHash,
    32
);

// =============================================================================
// Token Quantities
// =============================================================================

/// Unsigned token quantity.
///
/// Serialized as a decimal string so entity documents survive JSON number
/// precision limits everywhere they travel (JSONB, GraphQL, snapshots).
/// Arithmetic saturates: accumulator invariants must never panic a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct AmountVisitor;

        impl serde::de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a decimal string or unsigned integer")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse::<u128>().map(Amount).map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(Amount(v as u128))
            }

            fn visit_u128<E: serde::de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(Amount(v))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Signed token balance.
///
/// Fraction balances are signed: anomalous event orderings can drive a
/// holder's balance transiently negative, and that state must survive a
/// round-trip rather than corrupt the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SignedAmount(pub i128);

impl SignedAmount {
    pub const ZERO: Self = Self(0);

    pub fn saturating_add_amount(self, rhs: Amount) -> Self {
        Self(self.0.saturating_add(clamp_to_i128(rhs)))
    }

    pub fn saturating_sub_amount(self, rhs: Amount) -> Self {
        Self(self.0.saturating_sub(clamp_to_i128(rhs)))
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

fn clamp_to_i128(value: Amount) -> i128 {
    value.0.min(i128::MAX as u128) as i128
}

impl From<i128> for SignedAmount {
    fn from(value: i128) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for SignedAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for SignedAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct SignedVisitor;

        impl serde::de::Visitor<'_> for SignedVisitor {
            type Value = SignedAmount;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a decimal string or integer")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<SignedAmount, E> {
                v.parse::<i128>().map(SignedAmount).map_err(E::custom)
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<SignedAmount, E> {
                Ok(SignedAmount(v as i128))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<SignedAmount, E> {
                Ok(SignedAmount(v as i128))
            }

            fn visit_i128<E: serde::de::Error>(self, v: i128) -> Result<SignedAmount, E> {
                Ok(SignedAmount(v))
            }
        }

        deserializer.deserialize_any(SignedVisitor)
    }
}

// =============================================================================
// Decoded Event Input
// =============================================================================

/// One decoded contract event as delivered by the ledger journal.
///
/// Parameters arrive pre-decoded against the contract ABI as a JSON object
/// keyed by parameter name; decoding failures are an upstream concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Emitting contract address.
    pub address: Address,
    /// Event name (e.g., "Bid").
    pub event: String,
    /// Decoded parameters keyed by name.
    pub params: serde_json::Value,
    /// Block number containing the log.
    pub block_number: u64,
    /// Block timestamp (unix seconds).
    pub block_timestamp: u64,
    /// Transaction hash containing the log.
    pub tx_hash: TxHash,
    /// Log index within the block (0-based, the canonical tiebreaker).
    pub log_index: u32,
    /// Log index within the transaction (0-based).
    pub tx_log_index: u32,
}

impl EventEnvelope {
    /// Unique identifier: block_number-log_index.
    pub fn id(&self) -> String {
        format!("{}-{}", self.block_number, self.log_index)
    }
}

/// All watched events of one block, in canonical log order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerBlock {
    /// Block number (height).
    pub number: u64,
    /// Block timestamp (unix seconds).
    pub timestamp: u64,
    /// Events ordered by ascending log index.
    pub events: Vec<EventEnvelope>,
}

// =============================================================================
// Indexer State
// =============================================================================

/// Indexer cursor tracking progress.
///
/// The cursor tracks the last fully processed block for each chain,
/// enabling the indexer to resume from where it left off. The journal is
/// immutable append-only, so no hash is kept for reorg detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerCursor {
    /// Chain identifier (e.g., "11155111").
    pub chain_id: String,
    /// Last fully processed block number.
    pub last_indexed_block: u64,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Static Data-Source Manifest
// =============================================================================

/// Static data-source manifest: the contracts watched from startup.
///
/// One file per deployment (local, testnet, mainnet), loaded at boot.
/// Contracts deployed at runtime register through the dynamic registry
/// instead ([`crate::sources::DataSourceRegistry`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Chain the deployment addresses belong to (e.g., "11155111").
    pub chain_id: String,
    /// Watched contract bindings.
    pub sources: Vec<StaticSource>,
}

/// One statically configured contract binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticSource {
    /// Handler template name (e.g., "CrowdSale").
    pub template: String,
    /// Deployed contract address.
    pub address: Address,
    /// First block to deliver events from.
    #[serde(default)]
    pub start_block: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_roundtrip() {
        let hex = "0x358ab7e2dcbd1d4bd5be6c8b6e44e4d5b2f59a4b";
        let address = Address::from_hex(hex).unwrap();
        assert_eq!(address.to_hex(), hex);
    }

    #[test]
    fn address_without_prefix() {
        let hex = "358ab7e2dcbd1d4bd5be6c8b6e44e4d5b2f59a4b";
        let address = Address::from_hex(hex).unwrap();
        assert_eq!(address.to_hex(), format!("0x{}", hex));
    }

    #[test]
    fn address_invalid_length() {
        // 32 bytes is a hash, not an address
        let hex = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        assert!(Address::from_hex(hex).is_err());
    }

    #[test]
    fn zero_address_detection() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_hex("0x358ab7e2dcbd1d4bd5be6c8b6e44e4d5b2f59a4b")
            .unwrap()
            .is_zero());
    }

    #[test]
    fn address_serde_is_hex_string() {
        let address = Address::from_hex("0x358ab7e2dcbd1d4bd5be6c8b6e44e4d5b2f59a4b").unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"0x358ab7e2dcbd1d4bd5be6c8b6e44e4d5b2f59a4b\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }

    #[test]
    fn amount_serde_is_decimal_string() {
        let amount = Amount(340_282_366_920_938_463_463_374_607_431_768_211_455);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"340282366920938463463374607431768211455\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn amount_accepts_json_numbers() {
        let amount: Amount = serde_json::from_str("500").unwrap();
        assert_eq!(amount, Amount(500));
    }

    #[test]
    fn signed_amount_crosses_zero() {
        let balance = SignedAmount::ZERO.saturating_sub_amount(Amount(400));
        assert_eq!(balance, SignedAmount(-400));
        assert!(!balance.is_positive());
        assert!(balance.saturating_add_amount(Amount(1000)).is_positive());
    }

    #[test]
    fn envelope_id_is_block_and_log_index() {
        let event = EventEnvelope {
            address: Address::ZERO,
            event: "Bid".into(),
            params: serde_json::Value::Null,
            block_number: 420,
            block_timestamp: 1_690_000_000,
            tx_hash: TxHash::from([0u8; 32]),
            log_index: 7,
            tx_log_index: 0,
        };
        assert_eq!(event.id(), "420-7");
    }
}
