//! Per-validator epoch reward records.
//!
//! A record moves from unfinalized to finalized exactly once. Epochs of a
//! validator are finalized strictly in order, starting from any epoch for
//! a validator that has never finalized.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use colla_types::{Address, Amount, Epoch};

use crate::{RewardError, Result};

/// Reward pool fixed for one (validator, epoch).
#[serde_as]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochReward {
    /// Tokens minted for the epoch.
    #[serde_as(as = "DisplayFromStr")]
    pub total_reward: Amount,
    /// Aggregate TWAB of the validator over the epoch.
    #[serde_as(as = "DisplayFromStr")]
    pub total_twab: u128,
    pub finalized: bool,
}

#[derive(Clone, Debug, Default)]
pub struct EpochLedger {
    records: HashMap<(Address, Epoch), EpochReward>,
    last_finalized: HashMap<Address, Epoch>,
}

impl EpochLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `(validator, epoch)`, if one exists.
    pub fn get(&self, validator: &Address, epoch: Epoch) -> Option<&EpochReward> {
        self.records.get(&(*validator, epoch))
    }

    /// Finalized record for `(validator, epoch)`, if any.
    pub fn finalized(&self, validator: &Address, epoch: Epoch) -> Option<&EpochReward> {
        self.get(validator, epoch).filter(|record| record.finalized)
    }

    /// Last finalized epoch of `validator`, or 0 if it never finalized.
    pub fn last_finalized(&self, validator: &Address) -> Epoch {
        self.last_finalized.get(validator).copied().unwrap_or(0)
    }

    /// Check that `epoch` is the next epoch `validator` may finalize.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidEpoch`] for epoch 0
    /// - [`RewardError::EpochAlreadyFinalized`] if the record is already final
    /// - [`RewardError::EpochNotSequential`] if `epoch` is not `last + 1`
    pub fn check_finalizable(&self, validator: &Address, epoch: Epoch) -> Result<()> {
        if epoch == 0 {
            return Err(RewardError::InvalidEpoch(epoch));
        }
        if self.finalized(validator, epoch).is_some() {
            return Err(RewardError::EpochAlreadyFinalized {
                validator: *validator,
                epoch,
            });
        }
        let last = self.last_finalized(validator);
        if last != 0 {
            let expected = last.checked_add(1).ok_or(RewardError::Overflow)?;
            if epoch != expected {
                return Err(RewardError::EpochNotSequential {
                    expected,
                    actual: epoch,
                });
            }
        }
        Ok(())
    }

    /// Finalize `(validator, epoch)` with the given pool.
    ///
    /// # Errors
    ///
    /// Same as [`EpochLedger::check_finalizable`].
    pub fn finalize(
        &mut self,
        validator: Address,
        epoch: Epoch,
        total_reward: Amount,
        total_twab: u128,
    ) -> Result<EpochReward> {
        self.check_finalizable(&validator, epoch)?;
        let record = EpochReward {
            total_reward,
            total_twab,
            finalized: true,
        };
        self.records.insert((validator, epoch), record);
        self.last_finalized.insert(validator, epoch);
        Ok(record)
    }

    /// Reinstall a persisted record without sequencing checks.
    pub fn restore(&mut self, validator: Address, epoch: Epoch, record: EpochReward) {
        self.records.insert((validator, epoch), record);
        if record.finalized {
            let last = self.last_finalized.entry(validator).or_insert(0);
            *last = (*last).max(epoch);
        }
    }

    /// Every record, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (Address, Epoch, &EpochReward)> {
        self.records
            .iter()
            .map(|((validator, epoch), record)| (*validator, *epoch, record))
    }
}
