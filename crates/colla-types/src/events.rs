//! Events emitted by the oracle store and the reward router.
//!
//! Components queue events as they commit state; the host drains and
//! persists or forwards them.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::{Address, Amount, Epoch, Timestamp};

/// A committed state change.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new ownership snapshot was installed for a validator.
    FeedStored {
        validator: Address,
        timestamp: Timestamp,
        /// Feed index allocated for the snapshot (starts at 1).
        index: u64,
        owner_count: usize,
    },
    /// An epoch's reward pool was fixed for a validator.
    EpochFinalized {
        validator: Address,
        epoch: Epoch,
        #[serde_as(as = "DisplayFromStr")]
        total_reward: Amount,
        #[serde_as(as = "DisplayFromStr")]
        total_twab: u128,
    },
    /// A distribution configuration was written.
    DistributionConfigSet {
        validator: Address,
        effective_epoch: Epoch,
        operator: Option<Address>,
        commission_bps: u16,
    },
    /// A target vault claimed its share of an epoch.
    RewardsClaimed {
        validator: Address,
        vault: Address,
        epoch: Epoch,
        #[serde_as(as = "DisplayFromStr")]
        gross: Amount,
        #[serde_as(as = "DisplayFromStr")]
        fee: Amount,
        #[serde_as(as = "DisplayFromStr")]
        net: Amount,
    },
    /// Non-target shares of an epoch were routed to the default recipient.
    NonTargetRewardsClaimed {
        validator: Address,
        epoch: Epoch,
        recipient: Address,
        #[serde_as(as = "DisplayFromStr")]
        amount: Amount,
        vaults: usize,
    },
}

impl Event {
    /// Short snake_case name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::FeedStored { .. } => "feed_stored",
            Event::EpochFinalized { .. } => "epoch_finalized",
            Event::DistributionConfigSet { .. } => "distribution_config_set",
            Event::RewardsClaimed { .. } => "rewards_claimed",
            Event::NonTargetRewardsClaimed { .. } => "non_target_rewards_claimed",
        }
    }

    /// The validator the event concerns.
    pub fn validator(&self) -> Address {
        match self {
            Event::FeedStored { validator, .. }
            | Event::EpochFinalized { validator, .. }
            | Event::DistributionConfigSet { validator, .. }
            | Event::RewardsClaimed { validator, .. }
            | Event::NonTargetRewardsClaimed { validator, .. } => *validator,
        }
    }
}
