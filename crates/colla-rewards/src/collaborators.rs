//! External collaborators of the reward router.
//!
//! The router pulls minted pools, epoch boundaries, value transfers and
//! operators-of-record through these traits. [`Treasury`],
//! [`LinearEpochClock`] and [`StaticOperatorRegistry`] are the in-process
//! implementations the daemon runs with.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use colla_types::{Address, Amount, Epoch, Timestamp};

use crate::{RewardError, Result};

/// Mints the reward pool for a validator's epoch.
pub trait RewardMinter {
    /// Mint and escrow everything owed to `validator`, returning the amount.
    fn mint_rewards_for(&mut self, validator: &Address) -> Result<Amount>;
}

/// Maps epochs to wall-clock boundaries.
pub trait EpochClock {
    /// Start time of `epoch`. Epoch `e` spans `[time_at(e), time_at(e + 1))`.
    fn time_at(&self, epoch: Epoch) -> Result<Timestamp>;
}

/// A payout from a validator's escrowed pool.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Validator whose escrow funds the transfer.
    pub validator: Address,
    pub recipient: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub amount: Amount,
}

/// Moves settled rewards to recipients.
pub trait ValueTransfer {
    /// Apply every transfer, or none of them on error.
    fn transfer_batch(&mut self, transfers: &[Transfer]) -> Result<()>;
}

/// Resolves a validator's operator-of-record.
pub trait OperatorRegistry {
    fn operator_of(&self, validator: &Address) -> Option<Address>;
}

/// Fixed-length epochs from a genesis timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinearEpochClock {
    pub genesis: Timestamp,
    pub duration_secs: u64,
}

impl LinearEpochClock {
    pub fn new(genesis: Timestamp, duration_secs: u64) -> Self {
        Self {
            genesis,
            duration_secs,
        }
    }

    /// Epoch containing `timestamp`, or `None` before genesis.
    pub fn epoch_at(&self, timestamp: Timestamp) -> Option<Epoch> {
        if timestamp < self.genesis || self.duration_secs == 0 {
            return None;
        }
        Some((timestamp - self.genesis) / self.duration_secs)
    }
}

impl EpochClock for LinearEpochClock {
    fn time_at(&self, epoch: Epoch) -> Result<Timestamp> {
        epoch
            .checked_mul(self.duration_secs)
            .and_then(|offset| self.genesis.checked_add(offset))
            .ok_or(RewardError::Overflow)
    }
}

/// Operators-of-record from a fixed map.
#[derive(Clone, Debug, Default)]
pub struct StaticOperatorRegistry {
    operators: HashMap<Address, Address>,
}

impl StaticOperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, validator: Address, operator: Address) {
        self.operators.insert(validator, operator);
    }
}

impl FromIterator<(Address, Address)> for StaticOperatorRegistry {
    fn from_iter<I: IntoIterator<Item = (Address, Address)>>(iter: I) -> Self {
        Self {
            operators: iter.into_iter().collect(),
        }
    }
}

impl OperatorRegistry for StaticOperatorRegistry {
    fn operator_of(&self, validator: &Address) -> Option<Address> {
        self.operators.get(validator).copied()
    }
}

/// Persisted balances of one [`Treasury`] account.
#[serde_as]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryAccount {
    /// Deposited rewards not yet minted into an epoch pool.
    #[serde_as(as = "DisplayFromStr")]
    pub pending: Amount,
    /// Minted rewards held for claims.
    #[serde_as(as = "DisplayFromStr")]
    pub escrow: Amount,
    /// Paid-out balance of the account as a recipient.
    #[serde_as(as = "DisplayFromStr")]
    pub balance: Amount,
}

/// In-process reward bank.
///
/// Deposits accrue as pending per validator. Minting moves a validator's
/// whole pending amount into its escrow, and transfers pay recipients out
/// of escrow.
#[derive(Clone, Debug, Default)]
pub struct Treasury {
    accounts: BTreeMap<Address, TreasuryAccount>,
}

impl Treasury {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_accounts(accounts: impl IntoIterator<Item = (Address, TreasuryAccount)>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
        }
    }

    /// Queue `amount` of rewards for `validator`'s next finalization.
    ///
    /// # Errors
    ///
    /// - [`RewardError::Overflow`] if the pending amount overflows
    pub fn deposit(&mut self, validator: Address, amount: Amount) -> Result<Amount> {
        let account = self.accounts.entry(validator).or_default();
        account.pending = account
            .pending
            .checked_add(amount)
            .ok_or(RewardError::Overflow)?;
        tracing::debug!(%validator, amount, pending = account.pending, "rewards deposited");
        Ok(account.pending)
    }

    pub fn account(&self, address: &Address) -> TreasuryAccount {
        self.accounts.get(address).copied().unwrap_or_default()
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.account(address).balance
    }

    pub fn escrow_of(&self, validator: &Address) -> Amount {
        self.account(validator).escrow
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &TreasuryAccount)> {
        self.accounts.iter()
    }
}

impl RewardMinter for Treasury {
    fn mint_rewards_for(&mut self, validator: &Address) -> Result<Amount> {
        let Some(account) = self.accounts.get_mut(validator) else {
            return Ok(0);
        };
        let minted = account.pending;
        let escrow = account
            .escrow
            .checked_add(minted)
            .ok_or_else(|| RewardError::Mint(format!("escrow overflow for {validator}")))?;
        account.escrow = escrow;
        account.pending = 0;
        Ok(minted)
    }
}

impl ValueTransfer for Treasury {
    fn transfer_batch(&mut self, transfers: &[Transfer]) -> Result<()> {
        // Stage against copies so a failing transfer leaves every account as it was.
        let mut staged: BTreeMap<Address, TreasuryAccount> = BTreeMap::new();
        for transfer in transfers {
            let mut source = staged
                .get(&transfer.validator)
                .copied()
                .unwrap_or_else(|| self.account(&transfer.validator));
            source.escrow = source.escrow.checked_sub(transfer.amount).ok_or_else(|| {
                RewardError::Transfer(format!(
                    "escrow of {} holds {}, transfer needs {}",
                    transfer.validator, source.escrow, transfer.amount
                ))
            })?;
            staged.insert(transfer.validator, source);

            let mut recipient = staged
                .get(&transfer.recipient)
                .copied()
                .unwrap_or_else(|| self.account(&transfer.recipient));
            recipient.balance = recipient
                .balance
                .checked_add(transfer.amount)
                .ok_or_else(|| RewardError::Transfer(format!("balance overflow for {}", transfer.recipient)))?;
            staged.insert(transfer.recipient, recipient);
        }
        self.accounts.extend(staged);
        Ok(())
    }
}
