//! The reward router.
//!
//! Finalization fixes an epoch's pool and aggregate TWAB. Claims split the
//! pool by each vault's TWAB over the epoch:
//! `gross = total_reward * vault_twab / total_twab`, computed at full
//! precision. Target vaults receive `gross - fee`; non-target shares are
//! summed per epoch and paid to the config's default recipient.
//!
//! Mutations plan every check, share and transfer first, issue a single
//! transfer batch, and commit ledger changes only once the batch succeeds.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use colla_oracle::{OracleError, TwabSource};
use colla_types::events::Event;
use colla_types::math::mul_div;
use colla_types::{Address, Amount, Epoch, Timestamp};

use crate::claims::ClaimLedger;
use crate::collaborators::{EpochClock, OperatorRegistry, RewardMinter, Transfer, ValueTransfer};
use crate::config::{DistributionConfig, DistributionConfigStore};
use crate::ledger::{EpochLedger, EpochReward};
use crate::{RewardError, Result};

/// Global roles, injected as a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterRoles {
    /// May set any validator's distribution config.
    #[serde(default)]
    pub admins: BTreeSet<Address>,
    /// May settle non-target rewards for any validator.
    #[serde(default)]
    pub operators: BTreeSet<Address>,
}

impl RouterRoles {
    pub fn new(
        admins: impl IntoIterator<Item = Address>,
        operators: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            admins: admins.into_iter().collect(),
            operators: operators.into_iter().collect(),
        }
    }

    pub fn is_admin(&self, caller: &Address) -> bool {
        self.admins.contains(caller)
    }

    pub fn is_operator(&self, caller: &Address) -> bool {
        self.operators.contains(caller)
    }
}

/// One settled (vault, epoch) share.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLine {
    pub epoch: Epoch,
    pub vault: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub gross: Amount,
    #[serde_as(as = "DisplayFromStr")]
    pub fee: Amount,
    #[serde_as(as = "DisplayFromStr")]
    pub net: Amount,
}

/// Outcome of a claim call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub validator: Address,
    pub lines: Vec<ClaimLine>,
    pub transfers: Vec<Transfer>,
}

impl ClaimReceipt {
    /// Sum of net amounts across all lines.
    pub fn total_net(&self) -> Amount {
        self.lines.iter().map(|line| line.net).sum()
    }

    pub fn total_fees(&self) -> Amount {
        self.lines.iter().map(|line| line.fee).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Epoch reward router over an [`EpochClock`].
#[derive(Debug)]
pub struct RewardRouter<C> {
    roles: RouterRoles,
    clock: C,
    ledger: EpochLedger,
    configs: DistributionConfigStore,
    claims: ClaimLedger,
    events: Vec<Event>,
}

impl<C: EpochClock> RewardRouter<C> {
    pub fn new(roles: RouterRoles, clock: C) -> Self {
        Self::from_parts(
            roles,
            clock,
            EpochLedger::new(),
            DistributionConfigStore::new(),
            ClaimLedger::new(),
        )
    }

    /// Rebuild a router from persisted state.
    pub fn from_parts(
        roles: RouterRoles,
        clock: C,
        ledger: EpochLedger,
        configs: DistributionConfigStore,
        claims: ClaimLedger,
    ) -> Self {
        Self {
            roles,
            clock,
            ledger,
            configs,
            claims,
            events: Vec::new(),
        }
    }

    pub fn roles(&self) -> &RouterRoles {
        &self.roles
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn ledger(&self) -> &EpochLedger {
        &self.ledger
    }

    pub fn configs(&self) -> &DistributionConfigStore {
        &self.configs
    }

    pub fn claims(&self) -> &ClaimLedger {
        &self.claims
    }

    pub fn epoch_reward(&self, validator: &Address, epoch: Epoch) -> Option<&EpochReward> {
        self.ledger.get(validator, epoch)
    }

    pub fn last_finalized_epoch(&self, validator: &Address) -> Epoch {
        self.ledger.last_finalized(validator)
    }

    /// Gross amount claimed by `vault` for `epoch`, or 0.
    pub fn claimed_amount(&self, validator: &Address, vault: &Address, epoch: Epoch) -> Amount {
        self.claims.claimed(validator, vault, epoch)
    }

    pub fn applicable_config(&self, validator: &Address, epoch: Epoch) -> &DistributionConfig {
        self.configs.applicable(validator, epoch)
    }

    pub fn config_epochs(&self, validator: &Address) -> &[Epoch] {
        self.configs.epochs(validator)
    }

    /// `[start, end)` of `epoch`.
    ///
    /// # Errors
    ///
    /// - [`RewardError::Overflow`] if a boundary cannot be represented
    pub fn epoch_bounds(&self, epoch: Epoch) -> Result<(Timestamp, Timestamp)> {
        let next = epoch.checked_add(1).ok_or(RewardError::Overflow)?;
        Ok((self.clock.time_at(epoch)?, self.clock.time_at(next)?))
    }

    /// Take the events queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Fix the reward pool of `(validator, epoch)`.
    ///
    /// Anyone may finalize. The aggregate TWAB is read before minting so
    /// a rejected finalization never strands minted rewards.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidEpoch`], [`RewardError::EpochAlreadyFinalized`],
    ///   [`RewardError::EpochNotSequential`] on sequencing violations
    /// - [`RewardError::NoRewards`] if the aggregate TWAB or the minted pool is zero
    /// - [`RewardError::Oracle`] if the epoch window cannot be queried
    pub fn finalize_epoch(
        &mut self,
        oracle: &impl TwabSource,
        minter: &mut impl RewardMinter,
        epoch: Epoch,
        validator: Address,
    ) -> Result<EpochReward> {
        self.ledger.check_finalizable(&validator, epoch)?;
        let (start, end) = self.epoch_bounds(epoch)?;

        let total_twab = oracle.total_twab(start, end, &validator)?;
        if total_twab == 0 {
            return Err(RewardError::NoRewards);
        }
        let total_reward = minter.mint_rewards_for(&validator)?;
        if total_reward == 0 {
            return Err(RewardError::NoRewards);
        }

        let record = self
            .ledger
            .finalize(validator, epoch, total_reward, total_twab)?;
        tracing::info!(%validator, epoch, total_reward, total_twab, "epoch finalized");
        self.events.push(Event::EpochFinalized {
            validator,
            epoch,
            total_reward,
            total_twab,
        });
        Ok(record)
    }

    /// Record `config` for `validator` from `start_epoch` onward.
    ///
    /// Allowed for admins, the operator of the config applicable at
    /// `start_epoch`, and the validator's operator-of-record.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidCommission`] if the rate exceeds 10,000 bps
    /// - [`RewardError::Unauthorized`] if the caller holds none of the roles above
    /// - [`RewardError::EpochOrder`] if `start_epoch` precedes the last effective epoch
    pub fn set_distribution_config(
        &mut self,
        registry: &impl OperatorRegistry,
        caller: Address,
        validator: Address,
        start_epoch: Epoch,
        config: DistributionConfig,
    ) -> Result<()> {
        if config.commission_bps > colla_types::MAX_COMMISSION_BPS {
            return Err(RewardError::InvalidCommission(config.commission_bps));
        }
        let authorized = self.roles.is_admin(&caller)
            || self.configs.applicable(&validator, start_epoch).operator == Some(caller)
            || registry.operator_of(&validator) == Some(caller);
        if !authorized {
            return Err(RewardError::Unauthorized { caller });
        }

        let operator = config.operator;
        let commission_bps = config.commission_bps;
        let targets = config.targets.len();
        self.configs.set(validator, start_epoch, config)?;

        tracing::info!(%validator, %caller, start_epoch, commission_bps, targets, "distribution config set");
        self.events.push(Event::DistributionConfigSet {
            validator,
            effective_epoch: start_epoch,
            operator,
            commission_bps,
        });
        Ok(())
    }

    /// Claim `vault`'s shares for every epoch in `from..=to`.
    ///
    /// Unfinalized, already-claimed and zero-TWAB epochs contribute
    /// nothing. Commission goes to the applicable fee recipient.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidEpochRange`] if `from > to`
    /// - [`RewardError::NotATarget`] if `vault` is not a target in some epoch of the range
    /// - [`RewardError::Transfer`] if the payout batch fails; nothing is recorded
    pub fn claim_rewards(
        &mut self,
        oracle: &impl TwabSource,
        bank: &mut impl ValueTransfer,
        vault: Address,
        validator: Address,
        from: Epoch,
        to: Epoch,
    ) -> Result<ClaimReceipt> {
        check_range(from, to)?;

        let mut lines = Vec::new();
        let mut payouts: BTreeMap<Address, Amount> = BTreeMap::new();
        for epoch in from..=to {
            let config = self.configs.applicable(&validator, epoch);
            if !config.is_target(&vault) {
                return Err(RewardError::NotATarget { vault, epoch });
            }
            let gross = self.gross_share(oracle, &validator, &vault, epoch)?;
            if gross == 0 {
                continue;
            }
            let fee = config.fee_for(gross)?;
            let net = gross - fee;
            if let (Some(recipient), true) = (config.fee_recipient(), fee > 0) {
                add_payout(&mut payouts, recipient, fee)?;
            }
            add_payout(&mut payouts, vault, net)?;
            lines.push(ClaimLine {
                epoch,
                vault,
                gross,
                fee,
                net,
            });
        }

        let transfers = to_transfers(validator, payouts);
        if !transfers.is_empty() {
            bank.transfer_batch(&transfers)?;
        }

        for line in &lines {
            self.claims.record(validator, vault, line.epoch, line.gross);
            self.events.push(Event::RewardsClaimed {
                validator,
                vault,
                epoch: line.epoch,
                gross: line.gross,
                fee: line.fee,
                net: line.net,
            });
        }
        let receipt = ClaimReceipt {
            validator,
            lines,
            transfers,
        };
        tracing::info!(
            %validator,
            %vault,
            from,
            to,
            epochs = receipt.lines.len(),
            net = receipt.total_net(),
            "rewards claimed"
        );
        Ok(receipt)
    }

    /// Route the shares of non-target `vaults` to the default recipient.
    ///
    /// Vaults that are targets in an epoch are skipped for that epoch. No
    /// commission applies. Each epoch pays its default recipient once.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidEpochRange`] if `from > to`
    /// - [`RewardError::Unauthorized`] unless the caller is a global operator,
    ///   or the operator or default recipient of every epoch's config
    /// - [`RewardError::NoDefaultRecipient`] if an epoch owes rewards but names no recipient
    /// - [`RewardError::Transfer`] if the payout batch fails; nothing is recorded
    #[allow(clippy::too_many_arguments)]
    pub fn claim_for_non_targets(
        &mut self,
        oracle: &impl TwabSource,
        bank: &mut impl ValueTransfer,
        caller: Address,
        validator: Address,
        vaults: &[Address],
        from: Epoch,
        to: Epoch,
    ) -> Result<ClaimReceipt> {
        check_range(from, to)?;

        let vaults: BTreeSet<Address> = vaults.iter().copied().collect();
        let mut lines = Vec::new();
        let mut transfers = Vec::new();
        let mut settled = Vec::new();
        for epoch in from..=to {
            let config = self.configs.applicable(&validator, epoch);
            let authorized = self.roles.is_operator(&caller)
                || config.operator == Some(caller)
                || config.default_recipient == Some(caller);
            if !authorized {
                return Err(RewardError::Unauthorized { caller });
            }

            let mut epoch_total: Amount = 0;
            let mut epoch_vaults = 0;
            for vault in vaults.iter().filter(|vault| !config.is_target(vault)) {
                let gross = self.gross_share(oracle, &validator, vault, epoch)?;
                if gross == 0 {
                    continue;
                }
                epoch_total = epoch_total.checked_add(gross).ok_or(RewardError::Overflow)?;
                epoch_vaults += 1;
                lines.push(ClaimLine {
                    epoch,
                    vault: *vault,
                    gross,
                    fee: 0,
                    net: gross,
                });
            }
            if epoch_total == 0 {
                continue;
            }
            let recipient = config
                .default_recipient()
                .ok_or(RewardError::NoDefaultRecipient { validator, epoch })?;
            transfers.push(Transfer {
                validator,
                recipient,
                amount: epoch_total,
            });
            settled.push((epoch, recipient, epoch_total, epoch_vaults));
        }

        if !transfers.is_empty() {
            bank.transfer_batch(&transfers)?;
        }

        for line in &lines {
            self.claims.record(validator, line.vault, line.epoch, line.gross);
        }
        for (epoch, recipient, amount, vaults) in settled {
            tracing::info!(%validator, epoch, %recipient, amount, vaults, "non-target rewards claimed");
            self.events.push(Event::NonTargetRewardsClaimed {
                validator,
                epoch,
                recipient,
                amount,
                vaults,
            });
        }
        Ok(ClaimReceipt {
            validator,
            lines,
            transfers,
        })
    }

    /// Net amount `vault` could claim over `from..=to` right now.
    ///
    /// The vault's TWAB is checked first: an epoch with zero TWAB reports
    /// zero whether or not it is finalized. Commission is deducted only in
    /// epochs where the vault is a target.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidEpochRange`] if `from > to`
    pub fn get_claimable_rewards(
        &self,
        oracle: &impl TwabSource,
        validator: &Address,
        vault: &Address,
        from: Epoch,
        to: Epoch,
    ) -> Result<Amount> {
        check_range(from, to)?;

        let mut total: Amount = 0;
        for epoch in from..=to {
            let twab = self.vault_twab(oracle, validator, vault, epoch)?;
            if twab == 0 {
                continue;
            }
            let Some(record) = self.ledger.finalized(validator, epoch) else {
                continue;
            };
            if self.claims.is_claimed(validator, vault, epoch) || record.total_twab == 0 {
                continue;
            }
            let gross = mul_div(record.total_reward, twab, record.total_twab)
                .ok_or(RewardError::Overflow)?;
            let config = self.configs.applicable(validator, epoch);
            let fee = if config.is_target(vault) {
                config.fee_for(gross)?
            } else {
                0
            };
            total = total
                .checked_add(gross - fee)
                .ok_or(RewardError::Overflow)?;
        }
        Ok(total)
    }

    /// Gross share of `vault` in a finalized, unclaimed epoch; 0 otherwise.
    fn gross_share(
        &self,
        oracle: &impl TwabSource,
        validator: &Address,
        vault: &Address,
        epoch: Epoch,
    ) -> Result<Amount> {
        let Some(record) = self.ledger.finalized(validator, epoch) else {
            return Ok(0);
        };
        if self.claims.is_claimed(validator, vault, epoch) || record.total_twab == 0 {
            return Ok(0);
        }
        let twab = self.vault_twab(oracle, validator, vault, epoch)?;
        if twab == 0 {
            return Ok(0);
        }
        mul_div(record.total_reward, twab, record.total_twab).ok_or(RewardError::Overflow)
    }

    /// Vault TWAB over the epoch window. A vault the oracle has no data
    /// for holds nothing.
    fn vault_twab(
        &self,
        oracle: &impl TwabSource,
        validator: &Address,
        vault: &Address,
        epoch: Epoch,
    ) -> Result<u128> {
        let (start, end) = self.epoch_bounds(epoch)?;
        match oracle.ownership_twab(start, end, validator, vault) {
            Ok(twab) => Ok(twab),
            Err(OracleError::NoDataInRange { .. }) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

fn check_range(from: Epoch, to: Epoch) -> Result<()> {
    if from > to {
        return Err(RewardError::InvalidEpochRange { from, to });
    }
    Ok(())
}

fn add_payout(payouts: &mut BTreeMap<Address, Amount>, recipient: Address, amount: Amount) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    let entry = payouts.entry(recipient).or_insert(0);
    *entry = entry.checked_add(amount).ok_or(RewardError::Overflow)?;
    Ok(())
}

fn to_transfers(validator: Address, payouts: BTreeMap<Address, Amount>) -> Vec<Transfer> {
    payouts
        .into_iter()
        .map(|(recipient, amount)| Transfer {
            validator,
            recipient,
            amount,
        })
        .collect()
}
