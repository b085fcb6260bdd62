//! Per-validator feed history and TWAB accumulators.
//!
//! Each accepted feed allocates the next feed index (starting at 1) and
//! records the aggregate snapshot, the ordered ownership list and an
//! owner -> position map for that index. A checkpoint index maps feed
//! timestamps to feed indices; the first feed also seeds a sentinel
//! checkpoint at `timestamp - 1` pointing at index 0 ("no data").
//!
//! ## Accumulators
//!
//! Every owner (and the validator aggregate) carries a [`TwabSnapshot`]:
//!
//! ```text
//! cumulative_shares += previous_shares * (new_timestamp - previous_timestamp)
//! ```
//!
//! folded once per feed for every owner present in the previous feed. Each
//! fold or seed also appends a [`TwabPoint`] to the owner's history so the
//! cumulative value at any past instant is reconstructed exactly:
//!
//! ```text
//! cumulative(t) = point.cumulative + point.shares * (t - point.timestamp)
//! ```
//!
//! where `point` is the latest history entry at or before `t`.

use std::collections::HashMap;

use colla_types::{Address, OwnershipEntry, Shares, Timestamp, ValidatorSnapshot};
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointIndex;
use crate::{OracleError, Result};

/// Running shares-times-seconds accumulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwabSnapshot {
    /// Sum of `shares * elapsed_seconds`; never decreases.
    pub cumulative_shares: u128,
    /// Timestamp the accumulator was last folded or seeded at.
    pub last_update_time: Timestamp,
}

/// Accumulator state installed at a checkpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TwabPoint {
    /// Cumulative value at the checkpoint timestamp.
    pub cumulative: u128,
    /// Shares held from the checkpoint timestamp on.
    pub shares: Shares,
}

/// An owner's time-weighted average shares over a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerTwab {
    pub owner: Address,
    pub twab: u128,
}

#[derive(Clone, Debug, Default)]
struct TwabTrack {
    snapshot: TwabSnapshot,
    history: CheckpointIndex<TwabPoint>,
}

impl TwabTrack {
    /// Cumulative value at `timestamp`; `None` on overflow.
    fn cumulative_at(&self, timestamp: Timestamp) -> Option<u128> {
        if timestamp == self.snapshot.last_update_time {
            return Some(self.snapshot.cumulative_shares);
        }
        match self.history.upper_lookup(timestamp) {
            None => Some(0),
            Some(cp) => cp
                .value
                .shares
                .checked_mul(u128::from(timestamp - cp.timestamp))?
                .checked_add(cp.value.cumulative),
        }
    }

    /// Average over `[start, end)`. Inconsistent accumulators degrade to zero.
    fn average(&self, start: Timestamp, end: Timestamp) -> u128 {
        let (Some(at_end), Some(at_start)) = (self.cumulative_at(end), self.cumulative_at(start))
        else {
            tracing::warn!(start, end, "TWAB: cumulative overflow, reporting zero");
            return 0;
        };
        match at_end.checked_sub(at_start) {
            Some(delta) => delta / u128::from(end - start),
            None => {
                tracing::warn!(
                    start,
                    end,
                    at_start,
                    at_end,
                    "TWAB: cumulative underflow, reporting zero"
                );
                0
            }
        }
    }

    fn install(&mut self, timestamp: Timestamp, cumulative: u128, shares: Shares) -> Result<()> {
        self.history.push(timestamp, TwabPoint { cumulative, shares })?;
        self.snapshot = TwabSnapshot {
            cumulative_shares: cumulative,
            last_update_time: timestamp,
        };
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct FeedEntry {
    snapshot: ValidatorSnapshot,
    ownerships: Vec<OwnershipEntry>,
    /// owner -> 1-based position in `ownerships`.
    positions: HashMap<Address, usize>,
    total_shares: Shares,
}

/// Fully validated effect of one feed, computed before any mutation.
struct FeedPlan {
    timestamp: Timestamp,
    first_feed: bool,
    positions: HashMap<Address, usize>,
    total_shares: Shares,
    owner_updates: Vec<(Address, u128, Shares)>,
    aggregate_cumulative: u128,
}

/// Feed history of one validator.
#[derive(Clone, Debug)]
pub struct FeedStore {
    validator: Address,
    checkpoints: CheckpointIndex<u64>,
    /// Feed index `i` lives at `entries[i - 1]`.
    entries: Vec<FeedEntry>,
    owners: HashMap<Address, TwabTrack>,
    aggregate: TwabTrack,
    historical_owners: Vec<Address>,
}

impl FeedStore {
    /// Create an empty store for `validator`.
    pub fn new(validator: Address) -> Self {
        Self {
            validator,
            checkpoints: CheckpointIndex::new(),
            entries: Vec::new(),
            owners: HashMap::new(),
            aggregate: TwabTrack::default(),
            historical_owners: Vec::new(),
        }
    }

    /// The validator this store belongs to.
    pub fn validator(&self) -> Address {
        self.validator
    }

    /// Validate a feed without applying it.
    ///
    /// # Errors
    ///
    /// See [`FeedStore::push_feed`].
    pub fn check_feed(&self, timestamp: Timestamp, ownerships: &[OwnershipEntry]) -> Result<()> {
        self.plan(timestamp, ownerships).map(|_| ())
    }

    /// Install a new snapshot, folding every accumulator forward first.
    ///
    /// Returns the feed index allocated to the snapshot. Either the whole
    /// feed is applied or, on error, nothing is.
    ///
    /// # Errors
    ///
    /// - [`OracleError::ZeroTimestamp`] if `timestamp` is zero
    /// - [`OracleError::FeedTargetOutdated`] if `timestamp` is not after the latest feed
    /// - [`OracleError::ZeroAddress`] if an owner is the zero address
    /// - [`OracleError::DuplicateOwner`] if an owner appears twice
    /// - [`OracleError::Overflow`] if an accumulator or the share total overflows
    pub fn push_feed(
        &mut self,
        timestamp: Timestamp,
        snapshot: ValidatorSnapshot,
        ownerships: Vec<OwnershipEntry>,
    ) -> Result<u64> {
        let plan = self.plan(timestamp, &ownerships)?;

        if plan.first_feed {
            self.checkpoints.push(plan.timestamp - 1, 0)?;
        }
        let index = self.entries.len() as u64 + 1;
        self.checkpoints.push(plan.timestamp, index)?;

        for entry in &ownerships {
            if !self.owners.contains_key(&entry.owner) {
                self.historical_owners.push(entry.owner);
            }
        }
        for (owner, cumulative, shares) in plan.owner_updates {
            self.owners
                .entry(owner)
                .or_default()
                .install(plan.timestamp, cumulative, shares)?;
        }
        self.aggregate
            .install(plan.timestamp, plan.aggregate_cumulative, plan.total_shares)?;

        self.entries.push(FeedEntry {
            snapshot,
            ownerships,
            positions: plan.positions,
            total_shares: plan.total_shares,
        });

        Ok(index)
    }

    fn plan(&self, timestamp: Timestamp, ownerships: &[OwnershipEntry]) -> Result<FeedPlan> {
        if timestamp == 0 {
            return Err(OracleError::ZeroTimestamp);
        }

        let mut positions = HashMap::with_capacity(ownerships.len());
        let mut total_shares: Shares = 0;
        for (i, entry) in ownerships.iter().enumerate() {
            if entry.owner.is_zero() {
                return Err(OracleError::ZeroAddress);
            }
            if positions.insert(entry.owner, i + 1).is_some() {
                return Err(OracleError::DuplicateOwner(entry.owner));
            }
            total_shares = total_shares
                .checked_add(entry.shares)
                .ok_or(OracleError::Overflow)?;
        }

        let previous = match (self.checkpoints.latest(), self.entries.last()) {
            (Some(last), Some(entry)) => {
                if timestamp <= last.timestamp {
                    return Err(OracleError::FeedTargetOutdated {
                        provided: timestamp,
                        last: last.timestamp,
                    });
                }
                Some((last.timestamp, entry))
            }
            _ => None,
        };

        let current_shares = |owner: &Address| -> Shares {
            positions
                .get(owner)
                .map(|pos| ownerships[pos - 1].shares)
                .unwrap_or(0)
        };

        let mut owner_updates = Vec::with_capacity(ownerships.len());
        let aggregate_cumulative = match previous {
            Some((previous_time, previous_entry)) => {
                let elapsed = u128::from(timestamp - previous_time);
                for prior in &previous_entry.ownerships {
                    let base = self
                        .owners
                        .get(&prior.owner)
                        .map(|track| track.snapshot.cumulative_shares)
                        .unwrap_or(0);
                    let folded = prior
                        .shares
                        .checked_mul(elapsed)
                        .and_then(|weighted| base.checked_add(weighted))
                        .ok_or(OracleError::Overflow)?;
                    owner_updates.push((prior.owner, folded, current_shares(&prior.owner)));
                }
                previous_entry
                    .total_shares
                    .checked_mul(elapsed)
                    .and_then(|weighted| {
                        self.aggregate.snapshot.cumulative_shares.checked_add(weighted)
                    })
                    .ok_or(OracleError::Overflow)?
            }
            None => 0,
        };

        // Owners new to this feed: first-timers seed at zero, returning
        // owners keep the value frozen at their exit.
        for entry in ownerships {
            let was_present = previous
                .map(|(_, prev)| prev.positions.contains_key(&entry.owner))
                .unwrap_or(false);
            if !was_present {
                let base = self
                    .owners
                    .get(&entry.owner)
                    .map(|track| track.snapshot.cumulative_shares)
                    .unwrap_or(0);
                owner_updates.push((entry.owner, base, entry.shares));
            }
        }

        Ok(FeedPlan {
            timestamp,
            first_feed: previous.is_none(),
            positions,
            total_shares,
            owner_updates,
            aggregate_cumulative,
        })
    }

    /// Timestamp of the most recent feed, if any.
    pub fn last_feed_timestamp(&self) -> Option<Timestamp> {
        if self.entries.is_empty() {
            return None;
        }
        self.checkpoints.latest().map(|cp| cp.timestamp)
    }

    /// Number of feeds stored.
    pub fn feed_count(&self) -> usize {
        self.entries.len()
    }

    /// Feed index active at `timestamp`; `0` if none.
    pub fn index_at(&self, timestamp: Timestamp) -> u64 {
        self.checkpoints.upper_lookup_recent(timestamp)
    }

    fn entry_at(&self, timestamp: Timestamp) -> Result<&FeedEntry> {
        let index = self.index_at(timestamp);
        tracing::debug!(validator = %self.validator, timestamp, index, "feed lookup");
        index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i as usize))
            .ok_or(OracleError::FeedNotFound {
                validator: self.validator,
                timestamp,
            })
    }

    /// Aggregate snapshot active at `timestamp`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::FeedNotFound`] if no feed exists at or before `timestamp`
    pub fn snapshot_at(&self, timestamp: Timestamp) -> Result<&ValidatorSnapshot> {
        self.entry_at(timestamp).map(|entry| &entry.snapshot)
    }

    /// Full ownership list active at `timestamp`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::FeedNotFound`] if no feed exists at or before `timestamp`
    pub fn ownerships_at(&self, timestamp: Timestamp) -> Result<&[OwnershipEntry]> {
        self.entry_at(timestamp).map(|entry| entry.ownerships.as_slice())
    }

    /// Shares held by `owner` in the snapshot active at `timestamp`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::FeedNotFound`] if no feed exists at or before `timestamp`
    /// - [`OracleError::OwnershipNotFound`] if the owner has no entry in that snapshot
    pub fn ownership_at(&self, timestamp: Timestamp, owner: &Address) -> Result<Shares> {
        let entry = self.entry_at(timestamp)?;
        entry
            .positions
            .get(owner)
            .map(|pos| entry.ownerships[pos - 1].shares)
            .ok_or(OracleError::OwnershipNotFound {
                validator: self.validator,
                owner: *owner,
                timestamp,
            })
    }

    /// Reject empty/inverted windows and windows reaching past the last feed.
    fn check_window(&self, start: Timestamp, end: Timestamp) -> Result<()> {
        if start >= end {
            return Err(OracleError::InvalidTimeRange { start, end });
        }
        let last = self.last_feed_timestamp();
        if last.map_or(true, |last| end > last) {
            return Err(OracleError::NoDataInRange {
                validator: self.validator,
                end,
                last,
            });
        }
        Ok(())
    }

    /// Time-weighted average shares of `owner` over `[start, end)`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidTimeRange`] if `start >= end`
    /// - [`OracleError::NoDataInRange`] if the owner was never fed or `end`
    ///   is past the last feed
    pub fn owner_twab(&self, start: Timestamp, end: Timestamp, owner: &Address) -> Result<u128> {
        self.check_window(start, end)?;
        let track = self.owners.get(owner).ok_or(OracleError::NoDataInRange {
            validator: self.validator,
            end,
            last: self.last_feed_timestamp(),
        })?;
        Ok(track.average(start, end))
    }

    /// Time-weighted average of the summed shares over `[start, end)`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidTimeRange`] if `start >= end`
    /// - [`OracleError::NoDataInRange`] if `end` is past the last feed
    pub fn aggregate_twab(&self, start: Timestamp, end: Timestamp) -> Result<u128> {
        self.check_window(start, end)?;
        Ok(self.aggregate.average(start, end))
    }

    /// Every historical owner with a strictly positive TWAB over `[start, end)`,
    /// in first-seen order.
    ///
    /// # Errors
    ///
    /// Same window errors as [`FeedStore::aggregate_twab`].
    pub fn ownerships_twab(&self, start: Timestamp, end: Timestamp) -> Result<Vec<OwnerTwab>> {
        self.check_window(start, end)?;
        Ok(self
            .historical_owners
            .iter()
            .filter_map(|owner| {
                let twab = self.owners.get(owner)?.average(start, end);
                (twab > 0).then_some(OwnerTwab {
                    owner: *owner,
                    twab,
                })
            })
            .collect())
    }

    /// Current accumulator of `owner`.
    pub fn twab_snapshot(&self, owner: &Address) -> Option<TwabSnapshot> {
        self.owners.get(owner).map(|track| track.snapshot)
    }

    /// Current aggregate accumulator.
    pub fn aggregate_snapshot(&self) -> TwabSnapshot {
        self.aggregate.snapshot
    }

    /// Every owner that ever appeared in a feed, in first-seen order.
    pub fn historical_owners(&self) -> &[Address] {
        &self.historical_owners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn owners(list: &[(u8, u128)]) -> Vec<OwnershipEntry> {
        list.iter()
            .map(|(n, shares)| OwnershipEntry::new(addr(*n), *shares))
            .collect()
    }

    fn snapshot(amount: u128) -> ValidatorSnapshot {
        ValidatorSnapshot {
            collateral_amount: amount,
            collateral_shares: amount,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_feed_seeds_sentinel() {
        let mut store = FeedStore::new(addr(9));
        let index = store
            .push_feed(100, snapshot(100), owners(&[(1, 60), (2, 40)]))
            .expect("feed");
        assert_eq!(index, 1);
        assert_eq!(store.index_at(99), 0);
        assert_eq!(store.index_at(100), 1);
        assert_eq!(store.last_feed_timestamp(), Some(100));

        let err = store.snapshot_at(99).unwrap_err();
        assert!(matches!(err, OracleError::FeedNotFound { timestamp: 99, .. }));
    }

    #[test]
    fn test_ownership_lookup() {
        let mut store = FeedStore::new(addr(9));
        store
            .push_feed(100, snapshot(100), owners(&[(1, 60), (2, 40)]))
            .expect("feed");
        store
            .push_feed(200, snapshot(100), owners(&[(1, 100)]))
            .expect("feed");

        assert_eq!(store.ownership_at(150, &addr(2)).expect("owner 2"), 40);
        assert_eq!(store.ownership_at(200, &addr(1)).expect("owner 1"), 100);
        let err = store.ownership_at(250, &addr(2)).unwrap_err();
        assert!(matches!(err, OracleError::OwnershipNotFound { .. }));
    }

    #[test]
    fn test_constant_shares_twab() {
        let mut store = FeedStore::new(addr(9));
        store
            .push_feed(100, snapshot(100), owners(&[(1, 60), (2, 40)]))
            .expect("feed");
        store
            .push_feed(200, snapshot(100), owners(&[(1, 60), (2, 40)]))
            .expect("feed");

        assert_eq!(store.owner_twab(100, 200, &addr(1)).expect("A"), 60);
        assert_eq!(store.owner_twab(100, 200, &addr(2)).expect("B"), 40);
        assert_eq!(store.aggregate_twab(100, 200).expect("total"), 100);
    }

    #[test]
    fn test_fold_uses_previous_shares() {
        let mut store = FeedStore::new(addr(9));
        store.push_feed(100, snapshot(0), owners(&[(1, 10)])).expect("feed");
        store.push_feed(200, snapshot(0), owners(&[(1, 30)])).expect("feed");
        store.push_feed(300, snapshot(0), owners(&[(1, 30)])).expect("feed");

        let acc = store.twab_snapshot(&addr(1)).expect("snapshot");
        assert_eq!(acc.cumulative_shares, 10 * 100 + 30 * 100);
        assert_eq!(acc.last_update_time, 300);

        // 10 for 100s, 30 for 100s
        assert_eq!(store.owner_twab(100, 300, &addr(1)).expect("twab"), 20);
        // window inside the second interval
        assert_eq!(store.owner_twab(210, 290, &addr(1)).expect("twab"), 30);
        // window straddling the change: 10*50 + 30*50 over 100
        assert_eq!(store.owner_twab(150, 250, &addr(1)).expect("twab"), 20);
    }

    #[test]
    fn test_departed_and_returning_owner() {
        let mut store = FeedStore::new(addr(9));
        store
            .push_feed(100, snapshot(0), owners(&[(1, 50), (2, 50)]))
            .expect("feed");
        store.push_feed(200, snapshot(0), owners(&[(1, 100)])).expect("feed");
        store.push_feed(300, snapshot(0), owners(&[(1, 100)])).expect("feed");
        store
            .push_feed(400, snapshot(0), owners(&[(1, 50), (2, 50)]))
            .expect("feed");
        store
            .push_feed(500, snapshot(0), owners(&[(1, 50), (2, 50)]))
            .expect("feed");

        // owner 2: 50 over [100,200), 0 over [200,400), 50 over [400,500)
        assert_eq!(store.owner_twab(100, 500, &addr(2)).expect("twab"), 25);
        assert_eq!(store.owner_twab(200, 400, &addr(2)).expect("twab"), 0);
        assert_eq!(store.owner_twab(400, 500, &addr(2)).expect("twab"), 50);
        assert_eq!(store.aggregate_twab(100, 500).expect("total"), 100);
        assert_eq!(store.historical_owners(), &[addr(1), addr(2)]);
    }

    #[test]
    fn test_window_checks() {
        let mut store = FeedStore::new(addr(9));
        store.push_feed(100, snapshot(0), owners(&[(1, 1)])).expect("feed");
        store.push_feed(200, snapshot(0), owners(&[(1, 1)])).expect("feed");

        assert!(matches!(
            store.owner_twab(200, 200, &addr(1)).unwrap_err(),
            OracleError::InvalidTimeRange { start: 200, end: 200 }
        ));
        assert!(matches!(
            store.owner_twab(100, 201, &addr(1)).unwrap_err(),
            OracleError::NoDataInRange { end: 201, last: Some(200), .. }
        ));
        assert!(matches!(
            store.owner_twab(100, 200, &addr(7)).unwrap_err(),
            OracleError::NoDataInRange { .. }
        ));
    }

    #[test]
    fn test_window_before_first_feed_counts_zero() {
        let mut store = FeedStore::new(addr(9));
        store.push_feed(100, snapshot(0), owners(&[(1, 80)])).expect("feed");
        store.push_feed(200, snapshot(0), owners(&[(1, 80)])).expect("feed");
        // [0,100) has no shares, [100,200) has 80
        assert_eq!(store.owner_twab(0, 200, &addr(1)).expect("twab"), 40);
    }

    #[test]
    fn test_rejected_feed_leaves_store_untouched() {
        let mut store = FeedStore::new(addr(9));
        store.push_feed(100, snapshot(0), owners(&[(1, 10)])).expect("feed");

        let err = store
            .push_feed(100, snapshot(0), owners(&[(1, 20)]))
            .unwrap_err();
        assert!(matches!(
            err,
            OracleError::FeedTargetOutdated { provided: 100, last: 100 }
        ));
        let err = store
            .push_feed(150, snapshot(0), owners(&[(1, 20), (1, 5)]))
            .unwrap_err();
        assert!(matches!(err, OracleError::DuplicateOwner(_)));
        let err = store
            .push_feed(150, snapshot(0), vec![OwnershipEntry::new(Address::ZERO, 1)])
            .unwrap_err();
        assert!(matches!(err, OracleError::ZeroAddress));

        assert_eq!(store.feed_count(), 1);
        assert_eq!(store.last_feed_timestamp(), Some(100));
        let acc = store.twab_snapshot(&addr(1)).expect("snapshot");
        assert_eq!(acc, TwabSnapshot { cumulative_shares: 0, last_update_time: 100 });
    }

    #[test]
    fn test_zero_timestamp_rejected() {
        let mut store = FeedStore::new(addr(9));
        let err = store.push_feed(0, snapshot(0), Vec::new()).unwrap_err();
        assert!(matches!(err, OracleError::ZeroTimestamp));
    }

    #[test]
    fn test_overflow_rejected_atomically() {
        let mut store = FeedStore::new(addr(9));
        store
            .push_feed(1, snapshot(0), owners(&[(1, u128::MAX / 2)]))
            .expect("feed");
        let err = store.push_feed(10, snapshot(0), owners(&[(1, 1)])).unwrap_err();
        assert!(matches!(err, OracleError::Overflow));
        assert_eq!(store.feed_count(), 1);

        let err = store
            .push_feed(2, snapshot(0), owners(&[(1, u128::MAX), (2, 1)]))
            .unwrap_err();
        assert!(matches!(err, OracleError::Overflow));
    }

    #[test]
    fn test_ownerships_twab_skips_zero() {
        let mut store = FeedStore::new(addr(9));
        store
            .push_feed(100, snapshot(0), owners(&[(1, 10), (2, 0)]))
            .expect("feed");
        store.push_feed(200, snapshot(0), owners(&[(1, 10), (3, 5)])).expect("feed");
        store.push_feed(300, snapshot(0), owners(&[(1, 10), (3, 5)])).expect("feed");

        let twabs = store.ownerships_twab(100, 200).expect("twabs");
        assert_eq!(twabs, vec![OwnerTwab { owner: addr(1), twab: 10 }]);

        let twabs = store.ownerships_twab(100, 300).expect("twabs");
        assert_eq!(
            twabs,
            vec![
                OwnerTwab { owner: addr(1), twab: 10 },
                OwnerTwab { owner: addr(3), twab: 2 },
            ]
        );
    }
}
