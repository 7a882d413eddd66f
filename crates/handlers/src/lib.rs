//! Projection handler families for the Enzyme indexer.
//!
//! Each module owns one contract template and implements
//! [`enzyme_core::ports::EventHandler`] for it:
//!
//! - [`crowdsale`] / [`staked_crowdsale`] - sale lifecycle, bids, stakes, claims
//! - [`tokenizer`] - claim-token creation and dynamic source registration
//! - [`fraction_token`] - per-holder balances and supply accounting
//! - [`ipnft`] - reservations, mints, ownership, metadata ingestion
//! - [`mintpass`] - soulbound mint passes
//! - [`timelock`] - vesting schedules on dynamically watched contracts
//! - [`permissioner`] - agreement signatures
//! - [`swap`] - marketplace listings and allowlists
//!
//! [`registry::default_registry`] wires every family into one
//! [`enzyme_core::ports::HandlerRegistry`].

pub mod common;
pub mod crowdsale;
pub mod fraction_token;
pub mod ipnft;
pub mod metadata;
pub mod mintpass;
pub mod permissioner;
pub mod registry;
pub mod staked_crowdsale;
pub mod swap;
pub mod timelock;
pub mod tokenizer;
pub mod utils;

pub use registry::default_registry;
