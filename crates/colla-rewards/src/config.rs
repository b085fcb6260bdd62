//! Distribution configurations keyed by effective epoch.
//!
//! Each validator keeps an ascending list of effective epochs and a config
//! per entry. The config applicable to epoch `E` is the one at the largest
//! effective epoch `<= E`; before the first entry an empty config applies.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use colla_types::math::apply_bps;
use colla_types::{Address, Amount, Epoch, MAX_COMMISSION_BPS};

use crate::{RewardError, Result};

/// Reward routing for one validator from an effective epoch onward.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Vaults allowed to claim directly.
    #[serde(default)]
    pub targets: BTreeSet<Address>,
    /// Operator allowed to manage this validator's configs.
    #[serde(default)]
    pub operator: Option<Address>,
    /// Receives the shares of non-target vaults.
    #[serde(default)]
    pub default_recipient: Option<Address>,
    /// Receives commission on target claims.
    #[serde(default)]
    pub fee_recipient: Option<Address>,
    #[serde(default)]
    pub commission_bps: u16,
}

static EMPTY_CONFIG: DistributionConfig = DistributionConfig {
    targets: BTreeSet::new(),
    operator: None,
    default_recipient: None,
    fee_recipient: None,
    commission_bps: 0,
};

impl DistributionConfig {
    pub fn is_target(&self, vault: &Address) -> bool {
        self.targets.contains(vault)
    }

    /// Fee recipient, if set to a non-zero address.
    pub fn fee_recipient(&self) -> Option<Address> {
        self.fee_recipient.filter(|addr| !addr.is_zero())
    }

    /// Default recipient, if set to a non-zero address.
    pub fn default_recipient(&self) -> Option<Address> {
        self.default_recipient.filter(|addr| !addr.is_zero())
    }

    /// Commission owed on a target claim of `gross`.
    ///
    /// Zero unless both a fee recipient and a non-zero rate are set.
    ///
    /// # Errors
    ///
    /// - [`RewardError::Overflow`] if the fee cannot be computed
    pub fn fee_for(&self, gross: Amount) -> Result<Amount> {
        if self.fee_recipient().is_none() || self.commission_bps == 0 {
            return Ok(0);
        }
        apply_bps(gross, self.commission_bps).ok_or(RewardError::Overflow)
    }
}

#[derive(Clone, Debug, Default)]
struct ValidatorConfigs {
    epochs: Vec<Epoch>,
    configs: HashMap<Epoch, DistributionConfig>,
}

/// Effective-epoch configs for every validator.
#[derive(Clone, Debug, Default)]
pub struct DistributionConfigStore {
    validators: HashMap<Address, ValidatorConfigs>,
}

impl DistributionConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config applicable to `epoch`, or the empty config if none is.
    pub fn applicable(&self, validator: &Address, epoch: Epoch) -> &DistributionConfig {
        let Some(entry) = self.validators.get(validator) else {
            return &EMPTY_CONFIG;
        };
        let pos = entry.epochs.partition_point(|e| *e <= epoch);
        pos.checked_sub(1)
            .and_then(|i| entry.configs.get(&entry.epochs[i]))
            .unwrap_or(&EMPTY_CONFIG)
    }

    /// Effective epochs recorded for `validator`, ascending.
    pub fn epochs(&self, validator: &Address) -> &[Epoch] {
        self.validators
            .get(validator)
            .map(|entry| entry.epochs.as_slice())
            .unwrap_or(&[])
    }

    /// Last effective epoch recorded for `validator`.
    pub fn last_effective_epoch(&self, validator: &Address) -> Option<Epoch> {
        self.epochs(validator).last().copied()
    }

    /// Check that `config` may be recorded at `start_epoch`.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidCommission`] if the rate exceeds 10,000 bps
    /// - [`RewardError::EpochOrder`] if `start_epoch` precedes the last effective epoch
    pub fn check_set(
        &self,
        validator: &Address,
        start_epoch: Epoch,
        config: &DistributionConfig,
    ) -> Result<()> {
        if config.commission_bps > MAX_COMMISSION_BPS {
            return Err(RewardError::InvalidCommission(config.commission_bps));
        }
        if let Some(last) = self.last_effective_epoch(validator) {
            if start_epoch < last {
                return Err(RewardError::EpochOrder {
                    start: start_epoch,
                    last,
                });
            }
        }
        Ok(())
    }

    /// Record `config` at `start_epoch`, overwriting it in place if
    /// `start_epoch` is already the last effective epoch.
    ///
    /// # Errors
    ///
    /// Same as [`DistributionConfigStore::check_set`].
    pub fn set(
        &mut self,
        validator: Address,
        start_epoch: Epoch,
        config: DistributionConfig,
    ) -> Result<()> {
        self.check_set(&validator, start_epoch, &config)?;
        let entry = self.validators.entry(validator).or_default();
        if entry.epochs.last() != Some(&start_epoch) {
            entry.epochs.push(start_epoch);
        }
        entry.configs.insert(start_epoch, config);
        Ok(())
    }

    /// Every recorded config, in no particular validator order.
    pub fn iter(&self) -> impl Iterator<Item = (Address, Epoch, &DistributionConfig)> {
        self.validators.iter().flat_map(|(validator, entry)| {
            entry.epochs.iter().filter_map(move |epoch| {
                entry
                    .configs
                    .get(epoch)
                    .map(|config| (*validator, *epoch, config))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V: Address = Address::repeat_byte(1);

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn config_with(targets: &[u8], bps: u16) -> DistributionConfig {
        DistributionConfig {
            targets: targets.iter().map(|n| addr(*n)).collect(),
            operator: Some(addr(50)),
            default_recipient: Some(addr(51)),
            fee_recipient: Some(addr(52)),
            commission_bps: bps,
        }
    }

    #[test]
    fn test_applicable_before_any_config_is_empty() {
        let store = DistributionConfigStore::new();
        let config = store.applicable(&V, 10);
        assert!(config.targets.is_empty());
        assert_eq!(config.commission_bps, 0);
        assert!(config.operator.is_none());
    }

    #[test]
    fn test_applicable_resolves_rightmost_at_or_before() {
        let mut store = DistributionConfigStore::new();
        store.set(V, 5, config_with(&[1], 100)).expect("set 5");
        store.set(V, 10, config_with(&[2], 200)).expect("set 10");

        assert!(store.applicable(&V, 4).targets.is_empty());
        assert_eq!(store.applicable(&V, 5).commission_bps, 100);
        assert_eq!(store.applicable(&V, 9).commission_bps, 100);
        assert_eq!(store.applicable(&V, 10).commission_bps, 200);
        assert_eq!(store.applicable(&V, 1_000).commission_bps, 200);
        assert_eq!(store.epochs(&V), &[5, 10]);
    }

    #[test]
    fn test_backdated_config_rejected() {
        let mut store = DistributionConfigStore::new();
        store.set(V, 10, config_with(&[1], 0)).expect("set 10");
        let err = store.set(V, 9, config_with(&[2], 0)).unwrap_err();
        assert!(matches!(err, RewardError::EpochOrder { start: 9, last: 10 }));
        assert_eq!(store.epochs(&V), &[10]);
    }

    #[test]
    fn test_same_epoch_overwrites_in_place() {
        let mut store = DistributionConfigStore::new();
        store.set(V, 10, config_with(&[1], 100)).expect("first");
        store.set(V, 10, config_with(&[2], 300)).expect("overwrite");
        assert_eq!(store.epochs(&V), &[10]);
        let config = store.applicable(&V, 10);
        assert!(config.is_target(&addr(2)));
        assert!(!config.is_target(&addr(1)));
        assert_eq!(store.iter().count(), 1);
    }

    #[test]
    fn test_commission_above_max_rejected() {
        let mut store = DistributionConfigStore::new();
        let err = store.set(V, 1, config_with(&[], 10_001)).unwrap_err();
        assert!(matches!(err, RewardError::InvalidCommission(10_001)));
        store.set(V, 1, config_with(&[], 10_000)).expect("max rate");
    }

    #[test]
    fn test_fee_requires_recipient_and_rate() {
        let mut config = config_with(&[1], 1_000);
        assert_eq!(config.fee_for(250).expect("fee"), 25);

        config.fee_recipient = Some(Address::ZERO);
        assert_eq!(config.fee_for(250).expect("fee"), 0);

        config.fee_recipient = Some(addr(52));
        config.commission_bps = 0;
        assert_eq!(config.fee_for(250).expect("fee"), 0);
    }
}
