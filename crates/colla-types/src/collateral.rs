//! Collateral snapshot records delivered by feed producers.
//!
//! Share amounts travel as decimal strings so that 128-bit values survive
//! JSON consumers limited to 53-bit integers.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::{Address, Shares};

/// Aggregate collateral state of one validator at one feed.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSnapshot {
    /// Collateral held by the validator, in collateral base units.
    #[serde_as(as = "DisplayFromStr")]
    pub collateral_amount: u128,
    /// Total collateral shares outstanding for the validator.
    #[serde_as(as = "DisplayFromStr")]
    pub collateral_shares: Shares,
    /// Voting power attributed to the validator.
    #[serde_as(as = "DisplayFromStr")]
    pub voting_power: u128,
    /// Network-wide voting power at the time of the feed.
    #[serde_as(as = "DisplayFromStr")]
    pub total_voting_power: u128,
}

/// One owner's collateral shares within a validator snapshot.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipEntry {
    pub owner: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub shares: Shares,
}

impl OwnershipEntry {
    pub fn new(owner: Address, shares: Shares) -> Self {
        Self { owner, shares }
    }
}
