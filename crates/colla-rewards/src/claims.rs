//! Claimed amounts per (validator, vault, epoch).
//!
//! A non-zero entry marks the epoch claimed for that vault. The amount is
//! the gross share fixed at claim time; later config changes never alter it.

use std::collections::HashMap;

use colla_types::{Address, Amount, Epoch};

#[derive(Clone, Debug, Default)]
pub struct ClaimLedger {
    claimed: HashMap<(Address, Address, Epoch), Amount>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gross amount claimed, or 0 if unclaimed.
    pub fn claimed(&self, validator: &Address, vault: &Address, epoch: Epoch) -> Amount {
        self.claimed
            .get(&(*validator, *vault, epoch))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_claimed(&self, validator: &Address, vault: &Address, epoch: Epoch) -> bool {
        self.claimed(validator, vault, epoch) != 0
    }

    /// Record a gross claim. Zero amounts are not recorded.
    pub fn record(&mut self, validator: Address, vault: Address, epoch: Epoch, gross: Amount) {
        if gross != 0 {
            self.claimed.insert((validator, vault, epoch), gross);
        }
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    /// Every recorded claim as `(validator, vault, epoch, gross)`.
    pub fn iter(&self) -> impl Iterator<Item = (Address, Address, Epoch, Amount)> + '_ {
        self.claimed
            .iter()
            .map(|((validator, vault, epoch), gross)| (*validator, *vault, *epoch, *gross))
    }
}
