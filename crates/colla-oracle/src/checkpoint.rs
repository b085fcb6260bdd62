//! Append-only checkpoint index.
//!
//! Maps strictly increasing timestamps to values and answers "value of the
//! latest checkpoint at or before `t`" in O(log n). Lookups are biased toward
//! recent history: for longer histories the search first probes
//! `len - sqrt(len)`, which settles queries near the tip in a few steps.
//!
//! Feed stores use `CheckpointIndex<u64>` (timestamp -> feed index, where
//! `0` is the "no data" sentinel) and `CheckpointIndex<TwabPoint>` for
//! accumulator histories.

use colla_types::Timestamp;

use crate::{OracleError, Result};

/// Histories shorter than this skip the recency probe.
const RECENT_PROBE_MIN_LEN: usize = 5;

/// A `(timestamp, value)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint<V> {
    pub timestamp: Timestamp,
    pub value: V,
}

/// Checkpoints in strictly increasing timestamp order.
#[derive(Clone, Debug)]
pub struct CheckpointIndex<V> {
    entries: Vec<Checkpoint<V>>,
}

impl<V> Default for CheckpointIndex<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V: Copy> CheckpointIndex<V> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a checkpoint.
    ///
    /// # Errors
    ///
    /// - [`OracleError::FeedTargetOutdated`] if `timestamp` is not strictly
    ///   greater than the latest stored timestamp
    pub fn push(&mut self, timestamp: Timestamp, value: V) -> Result<()> {
        if let Some(last) = self.entries.last() {
            if timestamp <= last.timestamp {
                return Err(OracleError::FeedTargetOutdated {
                    provided: timestamp,
                    last: last.timestamp,
                });
            }
        }
        self.entries.push(Checkpoint { timestamp, value });
        Ok(())
    }

    /// Latest checkpoint whose timestamp is `<= timestamp`, if any.
    pub fn upper_lookup(&self, timestamp: Timestamp) -> Option<&Checkpoint<V>> {
        let len = self.entries.len();
        let mut low = 0;
        let mut high = len;

        if len > RECENT_PROBE_MIN_LEN {
            let mid = len - isqrt(len);
            if timestamp < self.entries[mid].timestamp {
                high = mid;
            } else {
                low = mid + 1;
            }
        }

        // Number of entries in [low, high) with key <= timestamp.
        let pos = low
            + self.entries[low..high].partition_point(|cp| cp.timestamp <= timestamp);
        pos.checked_sub(1).map(|i| &self.entries[i])
    }

    /// Most recent checkpoint, if any.
    pub fn latest(&self) -> Option<&Checkpoint<V>> {
        self.entries.last()
    }

    /// Number of checkpoints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no checkpoint has been pushed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate checkpoints in timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint<V>> {
        self.entries.iter()
    }
}

impl<V: Copy + Default> CheckpointIndex<V> {
    /// Value of the latest checkpoint at or before `timestamp`, or
    /// `V::default()` (the sentinel) if there is none.
    pub fn upper_lookup_recent(&self, timestamp: Timestamp) -> V {
        self.upper_lookup(timestamp)
            .map(|cp| cp.value)
            .unwrap_or_default()
    }
}

/// Integer square root, rounded down.
fn isqrt(n: usize) -> usize {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}
