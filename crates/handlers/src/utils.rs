//! Shared utilities for projection handlers.
//!
//! Event payloads arrive as ABI-shaped JSON objects, sometimes with nested
//! tuple members (`"sale": { "auctionToken": "0x..." }`). These accessors
//! resolve dotted paths against the payload and convert values with a
//! precise error naming the offending field.

use enzyme_core::error::{DomainError, DomainResult};
use enzyme_core::models::{Address, Amount, EventEnvelope};

// =============================================================================
// Path lookup
// =============================================================================

/// Resolve a dotted path (`"sale.auctionToken"`) against the event payload.
pub fn param<'a>(event: &'a EventEnvelope, path: &str) -> DomainResult<&'a serde_json::Value> {
    let mut current = &event.params;
    for segment in path.split('.') {
        current = current
            .get(segment)
            .ok_or_else(|| DomainError::MissingField {
                event: event.event.clone(),
                field: path.to_string(),
            })?;
    }
    Ok(current)
}

/// Like [`param`] but `Ok(None)` when the path is absent.
pub fn opt_param<'a>(event: &'a EventEnvelope, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = &event.params;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

// =============================================================================
// Value conversion
// =============================================================================

/// Parse a 20-byte address from a hex string value.
pub fn parse_address(value: &serde_json::Value) -> Option<Address> {
    value.as_str().and_then(|s| Address::from_hex(s).ok())
}

/// Parse a token quantity from JSON.
///
/// Handles both numeric and string representations, which is important
/// because JSON numbers are limited to u64 but EVM amounts are u256-sized.
pub fn parse_amount(value: &serde_json::Value) -> Option<Amount> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(|v| Amount(u128::from(v))),
        serde_json::Value::String(s) => s.parse::<u128>().ok().map(Amount),
        _ => None,
    }
}

/// Parse a u64 from JSON.
pub fn parse_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Parse arbitrary bytes from a hex string value.
pub fn parse_bytes(value: &serde_json::Value) -> Option<Vec<u8>> {
    let s = value.as_str()?;
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()
}

// =============================================================================
// Typed path accessors
// =============================================================================

fn invalid(path: &str, message: &str) -> DomainError {
    DomainError::InvalidField {
        field: path.to_string(),
        message: message.to_string(),
    }
}

/// Address at a dotted path.
pub fn address_param(event: &EventEnvelope, path: &str) -> DomainResult<Address> {
    let value = param(event, path)?;
    parse_address(value).ok_or_else(|| invalid(path, "expected a 20-byte hex address"))
}

/// Token quantity at a dotted path.
pub fn amount_param(event: &EventEnvelope, path: &str) -> DomainResult<Amount> {
    let value = param(event, path)?;
    parse_amount(value).ok_or_else(|| invalid(path, "expected an unsigned decimal amount"))
}

/// u64 at a dotted path.
pub fn u64_param(event: &EventEnvelope, path: &str) -> DomainResult<u64> {
    let value = param(event, path)?;
    parse_u64(value).ok_or_else(|| invalid(path, "expected an unsigned integer"))
}

/// u32 at a dotted path.
pub fn u32_param(event: &EventEnvelope, path: &str) -> DomainResult<u32> {
    let v = u64_param(event, path)?;
    u32::try_from(v).map_err(|_| invalid(path, "value exceeds u32"))
}

/// String at a dotted path.
pub fn string_param(event: &EventEnvelope, path: &str) -> DomainResult<String> {
    let value = param(event, path)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(path, "expected a string"))
}

/// 0x-prefixed hex blob at a dotted path, kept as its canonical string form.
pub fn hex_param(event: &EventEnvelope, path: &str) -> DomainResult<String> {
    let value = param(event, path)?;
    let s = value.as_str().ok_or_else(|| invalid(path, "expected a hex string"))?;
    if hex::decode(s.strip_prefix("0x").unwrap_or(s)).is_err() {
        return Err(invalid(path, "expected a hex string"));
    }
    Ok(s.to_string())
}

/// Bool at a dotted path.
pub fn bool_param(event: &EventEnvelope, path: &str) -> DomainResult<bool> {
    let value = param(event, path)?;
    value
        .as_bool()
        .ok_or_else(|| invalid(path, "expected a boolean"))
}

// =============================================================================
// Identifiers
// =============================================================================

/// Sale/listing/reservation ids arrive as u256 decimal strings or numbers;
/// entities key on the decimal string form.
pub fn id_param(event: &EventEnvelope, path: &str) -> DomainResult<String> {
    let value = param(event, path)?;
    match value {
        serde_json::Value::Number(n) if n.is_u64() => Ok(n.to_string()),
        serde_json::Value::String(s) if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() => {
            Ok(s.clone())
        }
        _ => Err(invalid(path, "expected an unsigned decimal identifier")),
    }
}

// =============================================================================
// Tests
// =============================================================================
