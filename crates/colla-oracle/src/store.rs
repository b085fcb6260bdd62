//! Collateral oracle store: one [`FeedStore`] per validator.
//!
//! Feed stores are created lazily on a validator's first feed. The store
//! also tracks every validator ever fed, in first-feed order, and exposes
//! the query surface used by reward settlement and vault collateral
//! accounting.

use std::collections::HashMap;

use colla_types::events::Event;
use colla_types::math::mul_div;
use colla_types::{Address, OwnershipEntry, Shares, Timestamp, ValidatorSnapshot};

use crate::feed::{FeedStore, TwabSnapshot};
use crate::{OracleError, Result};

pub use crate::feed::OwnerTwab;

/// Read-only TWAB queries consumed by reward settlement.
pub trait TwabSource {
    /// Aggregate TWAB of `validator` over `[start, end)`.
    fn total_twab(&self, start: Timestamp, end: Timestamp, validator: &Address) -> Result<u128>;

    /// TWAB of `owner`'s shares in `validator` over `[start, end)`.
    fn ownership_twab(
        &self,
        start: Timestamp,
        end: Timestamp,
        validator: &Address,
        owner: &Address,
    ) -> Result<u128>;
}

/// Feed history for every validator.
#[derive(Debug, Default)]
pub struct CollateralOracleStore {
    feeds: HashMap<Address, FeedStore>,
    validators: Vec<Address>,
    events: Vec<Event>,
}

impl CollateralOracleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a feed for `validator` without storing it.
    ///
    /// # Errors
    ///
    /// See [`CollateralOracleStore::store_feed_data`].
    pub fn check_feed_data(
        &self,
        validator: &Address,
        timestamp: Timestamp,
        ownerships: &[OwnershipEntry],
    ) -> Result<()> {
        if validator.is_zero() {
            return Err(OracleError::ZeroAddress);
        }
        match self.feeds.get(validator) {
            Some(store) => store.check_feed(timestamp, ownerships),
            None => FeedStore::new(*validator).check_feed(timestamp, ownerships),
        }
    }

    /// Store a new ownership snapshot for `validator` at `timestamp`.
    ///
    /// Folds every prior owner's accumulator (and the aggregate) forward by
    /// the elapsed interval, then installs the snapshot. Returns the feed
    /// index allocated to it.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ZeroAddress`] if `validator` or an owner is the zero address
    /// - [`OracleError::ZeroTimestamp`] if `timestamp` is zero
    /// - [`OracleError::FeedTargetOutdated`] if `timestamp` is not after the latest feed
    /// - [`OracleError::DuplicateOwner`] if an owner appears twice
    /// - [`OracleError::Overflow`] on accumulator overflow
    pub fn store_feed_data(
        &mut self,
        validator: Address,
        timestamp: Timestamp,
        snapshot: ValidatorSnapshot,
        ownerships: Vec<OwnershipEntry>,
    ) -> Result<u64> {
        if validator.is_zero() {
            return Err(OracleError::ZeroAddress);
        }
        let owner_count = ownerships.len();

        let index = match self.feeds.get_mut(&validator) {
            Some(store) => store.push_feed(timestamp, snapshot, ownerships)?,
            None => {
                let mut store = FeedStore::new(validator);
                let index = store.push_feed(timestamp, snapshot, ownerships)?;
                self.feeds.insert(validator, store);
                self.validators.push(validator);
                index
            }
        };

        tracing::info!(%validator, timestamp, index, owner_count, "feed stored");
        self.events.push(Event::FeedStored {
            validator,
            timestamp,
            index,
            owner_count,
        });
        Ok(index)
    }

    fn feed(&self, validator: &Address) -> Option<&FeedStore> {
        self.feeds.get(validator)
    }

    /// Feed store of `validator`, if it was ever fed.
    pub fn feed_store(&self, validator: &Address) -> Option<&FeedStore> {
        self.feed(validator)
    }

    /// Aggregate snapshot of `validator` active at `timestamp`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::FeedNotFound`] if no feed exists at or before `timestamp`
    pub fn get_validator(
        &self,
        timestamp: Timestamp,
        validator: &Address,
    ) -> Result<&ValidatorSnapshot> {
        self.feed(validator)
            .ok_or(OracleError::FeedNotFound {
                validator: *validator,
                timestamp,
            })?
            .snapshot_at(timestamp)
    }

    /// Shares held by `owner` in `validator` at `timestamp`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::FeedNotFound`] if no feed exists at or before `timestamp`
    /// - [`OracleError::OwnershipNotFound`] if the owner is absent from that snapshot
    pub fn get_collateral_ownership(
        &self,
        timestamp: Timestamp,
        validator: &Address,
        owner: &Address,
    ) -> Result<Shares> {
        self.feed(validator)
            .ok_or(OracleError::FeedNotFound {
                validator: *validator,
                timestamp,
            })?
            .ownership_at(timestamp, owner)
    }

    /// Time-weighted average shares of `owner` in `validator` over `[start, end)`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidTimeRange`] if `start >= end`
    /// - [`OracleError::NoDataInRange`] if the owner has no accumulator or
    ///   `end` lies past the validator's last feed
    pub fn get_collateral_ownership_twab(
        &self,
        start: Timestamp,
        end: Timestamp,
        validator: &Address,
        owner: &Address,
    ) -> Result<u128> {
        if start >= end {
            return Err(OracleError::InvalidTimeRange { start, end });
        }
        self.feed(validator)
            .ok_or(OracleError::NoDataInRange {
                validator: *validator,
                end,
                last: None,
            })?
            .owner_twab(start, end, owner)
    }

    /// Every owner of `validator` with a strictly positive TWAB over `[start, end)`.
    ///
    /// # Errors
    ///
    /// Same window errors as [`CollateralOracleStore::get_collateral_ownership_twab`].
    pub fn get_collateral_ownerships_twab(
        &self,
        start: Timestamp,
        end: Timestamp,
        validator: &Address,
    ) -> Result<Vec<OwnerTwab>> {
        if start >= end {
            return Err(OracleError::InvalidTimeRange { start, end });
        }
        self.feed(validator)
            .ok_or(OracleError::NoDataInRange {
                validator: *validator,
                end,
                last: None,
            })?
            .ownerships_twab(start, end)
    }

    /// Aggregate TWAB of `validator` over `[start, end)`; zero if never fed.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidTimeRange`] if `start >= end`
    /// - [`OracleError::NoDataInRange`] if `end` lies past the last feed
    pub fn get_total_twab(
        &self,
        start: Timestamp,
        end: Timestamp,
        validator: &Address,
    ) -> Result<u128> {
        if start >= end {
            return Err(OracleError::InvalidTimeRange { start, end });
        }
        match self.feed(validator) {
            Some(store) => store.aggregate_twab(start, end),
            None => Ok(0),
        }
    }

    /// Every owner that ever held shares in `validator`, in first-seen order.
    pub fn get_historical_owners(&self, validator: &Address) -> &[Address] {
        self.feed(validator)
            .map(FeedStore::historical_owners)
            .unwrap_or(&[])
    }

    /// Number of historical owners of `validator`.
    pub fn get_historical_owners_count(&self, validator: &Address) -> usize {
        self.get_historical_owners(validator).len()
    }

    /// Timestamp of `validator`'s latest feed, if any.
    pub fn get_last_feed_timestamp(&self, validator: &Address) -> Option<Timestamp> {
        self.feed(validator).and_then(FeedStore::last_feed_timestamp)
    }

    /// Current accumulator of `owner` in `validator`.
    pub fn get_twab_snapshot(&self, validator: &Address, owner: &Address) -> Option<TwabSnapshot> {
        self.feed(validator).and_then(|store| store.twab_snapshot(owner))
    }

    /// Every validator ever fed, in first-feed order.
    pub fn validators(&self) -> &[Address] {
        &self.validators
    }

    /// Number of validators ever fed.
    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Collateral summed over `validators` at `timestamp`.
    ///
    /// Validators without a feed at or before `timestamp` contribute nothing.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Overflow`] if the sum overflows
    pub fn total_collateral(&self, timestamp: Timestamp, validators: &[Address]) -> Result<u128> {
        validators.iter().try_fold(0u128, |total, validator| {
            match self.get_validator(timestamp, validator) {
                Ok(snapshot) => total
                    .checked_add(snapshot.collateral_amount)
                    .ok_or(OracleError::Overflow),
                Err(OracleError::FeedNotFound { .. }) => Ok(total),
                Err(e) => Err(e),
            }
        })
    }

    /// Collateral attributable to `owner` across `validators` at `timestamp`.
    ///
    /// Each validator contributes `shares * collateral_amount / collateral_shares`
    /// (rounded down). Validators with no feed at `timestamp`, no entry for
    /// `owner`, or no outstanding shares contribute nothing.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Overflow`] if a share conversion or the sum overflows
    pub fn owner_collateral(
        &self,
        timestamp: Timestamp,
        owner: &Address,
        validators: &[Address],
    ) -> Result<u128> {
        let mut total = 0u128;
        for validator in validators {
            let Some(store) = self.feed(validator) else {
                continue;
            };
            let snapshot = match store.snapshot_at(timestamp) {
                Ok(snapshot) => snapshot,
                Err(OracleError::FeedNotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            if snapshot.collateral_shares == 0 {
                continue;
            }
            let shares = match store.ownership_at(timestamp, owner) {
                Ok(shares) => shares,
                Err(OracleError::OwnershipNotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            let collateral = mul_div(shares, snapshot.collateral_amount, snapshot.collateral_shares)
                .ok_or(OracleError::Overflow)?;
            total = total.checked_add(collateral).ok_or(OracleError::Overflow)?;
        }
        Ok(total)
    }

    /// Take the events queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

impl TwabSource for CollateralOracleStore {
    fn total_twab(&self, start: Timestamp, end: Timestamp, validator: &Address) -> Result<u128> {
        self.get_total_twab(start, end, validator)
    }

    fn ownership_twab(
        &self,
        start: Timestamp,
        end: Timestamp,
        validator: &Address,
        owner: &Address,
    ) -> Result<u128> {
        self.get_collateral_ownership_twab(start, end, validator, owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn snapshot(amount: u128, shares: u128) -> ValidatorSnapshot {
        ValidatorSnapshot {
            collateral_amount: amount,
            collateral_shares: shares,
            voting_power: amount,
            total_voting_power: amount * 10,
        }
    }

    fn feed(store: &mut CollateralOracleStore, validator: u8, ts: u64, owners: &[(u8, u128)]) {
        let ownerships = owners
            .iter()
            .map(|(n, s)| OwnershipEntry::new(addr(*n), *s))
            .collect::<Vec<_>>();
        let total: u128 = owners.iter().map(|(_, s)| s).sum();
        store
            .store_feed_data(addr(validator), ts, snapshot(total * 2, total), ownerships)
            .expect("store feed");
    }

    #[test]
    fn test_scenario_unchanged_ownership() {
        let mut store = CollateralOracleStore::new();
        feed(&mut store, 10, 100, &[(1, 60), (2, 40)]);
        feed(&mut store, 10, 200, &[(1, 60), (2, 40)]);

        let v = addr(10);
        assert_eq!(store.get_collateral_ownership_twab(100, 200, &v, &addr(1)).expect("A"), 60);
        assert_eq!(store.get_collateral_ownership_twab(100, 200, &v, &addr(2)).expect("B"), 40);
        assert_eq!(store.get_total_twab(100, 200, &v).expect("total"), 100);
        assert_eq!(store.get_last_feed_timestamp(&v), Some(200));
        assert_eq!(store.get_historical_owners_count(&v), 2);
    }

    #[test]
    fn test_get_validator_returns_fed_snapshot() {
        let mut store = CollateralOracleStore::new();
        feed(&mut store, 10, 100, &[(1, 10)]);
        feed(&mut store, 10, 200, &[(1, 20)]);

        let v = addr(10);
        assert_eq!(store.get_validator(100, &v).expect("t1").collateral_shares, 10);
        assert_eq!(store.get_validator(199, &v).expect("t1+").collateral_shares, 10);
        assert_eq!(store.get_validator(200, &v).expect("t2").collateral_shares, 20);
        assert!(matches!(
            store.get_validator(99, &v).unwrap_err(),
            OracleError::FeedNotFound { timestamp: 99, .. }
        ));
        assert!(matches!(
            store.get_validator(100, &addr(11)).unwrap_err(),
            OracleError::FeedNotFound { .. }
        ));
    }

    #[test]
    fn test_validators_tracked_in_feed_order() {
        let mut store = CollateralOracleStore::new();
        feed(&mut store, 12, 100, &[(1, 1)]);
        feed(&mut store, 11, 100, &[(1, 1)]);
        feed(&mut store, 12, 200, &[(1, 1)]);
        assert_eq!(store.validators(), &[addr(12), addr(11)]);
        assert_eq!(store.validator_count(), 2);
    }

    #[test]
    fn test_total_twab_unfed_validator_is_zero() {
        let store = CollateralOracleStore::new();
        assert_eq!(store.get_total_twab(1, 2, &addr(5)).expect("total"), 0);
        assert!(matches!(
            store.get_total_twab(2, 2, &addr(5)).unwrap_err(),
            OracleError::InvalidTimeRange { .. }
        ));
        assert!(matches!(
            store
                .get_collateral_ownership_twab(1, 2, &addr(5), &addr(1))
                .unwrap_err(),
            OracleError::NoDataInRange { last: None, .. }
        ));
    }

    #[test]
    fn test_zero_validator_rejected() {
        let mut store = CollateralOracleStore::new();
        let err = store
            .store_feed_data(Address::ZERO, 100, ValidatorSnapshot::default(), Vec::new())
            .unwrap_err();
        assert!(matches!(err, OracleError::ZeroAddress));
        assert_eq!(store.validator_count(), 0);
    }

    #[test]
    fn test_outdated_feed_does_not_register_validator_or_event() {
        let mut store = CollateralOracleStore::new();
        feed(&mut store, 10, 100, &[(1, 1)]);
        let _ = store.drain_events();

        let err = store
            .store_feed_data(addr(10), 50, ValidatorSnapshot::default(), Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            OracleError::FeedTargetOutdated { provided: 50, last: 100 }
        ));
        assert!(store.drain_events().is_empty());
        assert_eq!(store.get_last_feed_timestamp(&addr(10)), Some(100));
    }

    #[test]
    fn test_events_emitted() {
        let mut store = CollateralOracleStore::new();
        feed(&mut store, 10, 100, &[(1, 1), (2, 2)]);
        let events = store.drain_events();
        assert_eq!(
            events,
            vec![Event::FeedStored {
                validator: addr(10),
                timestamp: 100,
                index: 1,
                owner_count: 2,
            }]
        );
    }

    #[test]
    fn test_owner_collateral_across_validators() {
        let mut store = CollateralOracleStore::new();
        // snapshot(amount = 2 * total shares)
        feed(&mut store, 10, 100, &[(1, 30), (2, 70)]);
        feed(&mut store, 11, 100, &[(1, 50)]);
        feed(&mut store, 12, 500, &[(1, 50)]);

        let validators = [addr(10), addr(11), addr(12), addr(13)];
        // 30 * 200/100 + 50 * 100/50; validator 12 not yet fed at 200
        assert_eq!(store.owner_collateral(200, &addr(1), &validators).expect("collateral"), 160);
        assert_eq!(store.owner_collateral(200, &addr(2), &validators).expect("collateral"), 140);
        assert_eq!(store.total_collateral(200, &validators).expect("total"), 300);
        assert_eq!(store.total_collateral(500, &validators).expect("total"), 400);
    }
}
