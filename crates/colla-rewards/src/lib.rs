//! # colla-rewards
//!
//! Epoch reward router. Reward pools are fixed per (validator, epoch) at
//! finalization and split pro rata to the TWAB each vault held over the
//! epoch. Target vaults claim directly and pay commission; everything
//! owed to non-target vaults is routed to the validator's default
//! recipient without commission.
//!
//! ## Modules
//!
//! - [`ledger`] — Per-validator epoch reward records and sequential finalization
//! - [`config`] — Effective-epoch distribution configurations
//! - [`claims`] — Claimed amounts per (validator, vault, epoch)
//! - [`collaborators`] — Minting, epoch clock, value transfer and operator registry seams
//! - [`router`] — The reward router

pub mod claims;
pub mod collaborators;
pub mod config;
pub mod ledger;
pub mod router;

use colla_oracle::OracleError;
use colla_types::{Address, Epoch};

pub use claims::ClaimLedger;
pub use collaborators::{
    EpochClock, LinearEpochClock, OperatorRegistry, RewardMinter, StaticOperatorRegistry,
    Transfer, Treasury, TreasuryAccount, ValueTransfer,
};
pub use config::{DistributionConfig, DistributionConfigStore};
pub use ledger::{EpochLedger, EpochReward};
pub use router::{ClaimLine, ClaimReceipt, RewardRouter, RouterRoles};

/// Error types for reward operations.
#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    /// Epoch 0 is never finalized or claimed.
    #[error("invalid epoch: {0}")]
    InvalidEpoch(Epoch),

    /// The (validator, epoch) record is already finalized.
    #[error("epoch {epoch} already finalized for validator {validator}")]
    EpochAlreadyFinalized {
        /// Validator whose epoch was finalized.
        validator: Address,
        /// The finalized epoch.
        epoch: Epoch,
    },

    /// Finalization skipped an epoch.
    #[error("epoch not sequential: expected {expected}, got {actual}")]
    EpochNotSequential {
        /// Next epoch that may be finalized.
        expected: Epoch,
        /// Requested epoch.
        actual: Epoch,
    },

    /// The minted pool or the aggregate TWAB is zero.
    #[error("no rewards available")]
    NoRewards,

    /// A distribution config was backdated before the last effective epoch.
    #[error("config epoch order violated: start {start} < last effective {last}")]
    EpochOrder {
        /// Requested effective epoch.
        start: Epoch,
        /// Last recorded effective epoch.
        last: Epoch,
    },

    /// Commission above 10,000 bps.
    #[error("invalid commission: {0} bps")]
    InvalidCommission(u16),

    /// The caller lacks the role required for the operation.
    #[error("unauthorized caller: {caller}")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// The vault is not in the epoch's target list.
    #[error("vault {vault} is not a target in epoch {epoch}")]
    NotATarget {
        /// The claiming vault.
        vault: Address,
        /// Epoch whose config excludes it.
        epoch: Epoch,
    },

    /// Epoch range is inverted.
    #[error("invalid epoch range: {from}..={to}")]
    InvalidEpochRange {
        /// First epoch of the range.
        from: Epoch,
        /// Last epoch of the range.
        to: Epoch,
    },

    /// Non-target rewards exist but the config names no default recipient.
    #[error("no default recipient for validator {validator} in epoch {epoch}")]
    NoDefaultRecipient {
        /// Validator whose config lacks a recipient.
        validator: Address,
        /// Epoch being settled.
        epoch: Epoch,
    },

    /// The value-transfer collaborator rejected a batch.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The minting collaborator failed.
    #[error("mint failed: {0}")]
    Mint(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow")]
    Overflow,

    /// Oracle query failed.
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
}

/// Convenience result type for reward operations.
pub type Result<T> = std::result::Result<T, RewardError>;
