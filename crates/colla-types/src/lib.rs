//! # colla-types
//!
//! Shared domain types used across the Colla workspace: addresses, the
//! collateral snapshot records fed by the oracle, fixed-point helpers and
//! the event records emitted by the oracle store and the reward router.

pub mod collateral;
pub mod events;
pub mod math;

/// 20-byte account address for validators, owners and recipients.
///
/// Parses `0x`-prefixed or bare hex. Serializes as lowercase `0x` hex.
pub use alloy_primitives::Address;

pub use collateral::{OwnershipEntry, ValidatorSnapshot};

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Reward epoch number. Epoch 0 is never finalized.
pub type Epoch = u64;

/// Reward token amount in base units.
pub type Amount = u128;

/// Collateral share amount in base units.
pub type Shares = u128;

/// Basis-point denominator (100% = 10,000 bps).
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Maximum commission rate in basis points.
pub const MAX_COMMISSION_BPS: u16 = BPS_DENOMINATOR;
