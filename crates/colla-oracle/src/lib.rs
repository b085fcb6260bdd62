//! # colla-oracle
//!
//! Collateral oracle store: an append-only, per-validator time series of
//! ownership snapshots with point-in-time lookup and incrementally maintained
//! time-weighted average balance (TWAB) accumulators.
//!
//! ## Modules
//!
//! - [`checkpoint`] — Monotonic timestamp -> value index with binary-search lookup
//! - [`feed`] — Per-validator feed history and TWAB accumulators
//! - [`store`] — Composition root over all validators
//! - [`ingest`] — Proof-verified feed ingestion and state-root caching

pub mod checkpoint;
pub mod feed;
pub mod ingest;
pub mod store;

use colla_types::{Address, Timestamp};

pub use checkpoint::{Checkpoint, CheckpointIndex};
pub use feed::{FeedStore, TwabPoint, TwabSnapshot};
pub use store::{CollateralOracleStore, OwnerTwab, TwabSource};

/// Error types for oracle operations.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// Query window is empty or inverted.
    #[error("invalid time range: start {start} >= end {end}")]
    InvalidTimeRange {
        /// Window start.
        start: Timestamp,
        /// Window end.
        end: Timestamp,
    },

    /// No checkpoint exists at or before the query time.
    #[error("feed not found for validator {validator} at {timestamp}")]
    FeedNotFound {
        /// Queried validator.
        validator: Address,
        /// Queried timestamp.
        timestamp: Timestamp,
    },

    /// The owner has no entry in the snapshot active at the query time.
    #[error("ownership of {owner} not found for validator {validator} at {timestamp}")]
    OwnershipNotFound {
        /// Queried validator.
        validator: Address,
        /// Queried owner.
        owner: Address,
        /// Queried timestamp.
        timestamp: Timestamp,
    },

    /// The query window extends past the known feed history.
    #[error("no data in range for validator {validator}: end {end}, last feed {last:?}")]
    NoDataInRange {
        /// Queried validator.
        validator: Address,
        /// Requested window end.
        end: Timestamp,
        /// Last known feed timestamp, if any.
        last: Option<Timestamp>,
    },

    /// Feed timestamp is not strictly greater than the latest checkpoint.
    #[error("feed target outdated: provided {provided} <= last {last}")]
    FeedTargetOutdated {
        /// The timestamp that was pushed.
        provided: Timestamp,
        /// The latest stored timestamp.
        last: Timestamp,
    },

    /// Feed timestamp of zero leaves no room for the sentinel checkpoint.
    #[error("feed timestamp must be non-zero")]
    ZeroTimestamp,

    /// A validator or owner address is the zero address.
    #[error("zero address")]
    ZeroAddress,

    /// The same owner appears twice in one ownership list.
    #[error("duplicate owner in ownership list: {0}")]
    DuplicateOwner(Address),

    /// The same validator appears twice in one ingestion batch.
    #[error("duplicate validator in batch: {0}")]
    DuplicateValidator(Address),

    /// A batch entry does not carry the batch's target timestamp.
    #[error("feed timestamp {actual} does not match batch target {expected}")]
    TargetMismatch {
        /// Batch target timestamp.
        expected: Timestamp,
        /// Timestamp carried by the submission.
        actual: Timestamp,
    },

    /// Ingestion batch carries no submissions.
    #[error("empty feed batch")]
    EmptyBatch,

    /// Arithmetic overflow while folding accumulators.
    #[error("arithmetic overflow in accumulator")]
    Overflow,

    /// The proof verifier rejected the batch.
    #[error("proof rejected for target {target}")]
    ProofRejected {
        /// Batch target timestamp.
        target: Timestamp,
    },

    /// No state root is cached and the grace window has passed.
    #[error("state root timeout: target {target}, now {now}, grace {grace}s")]
    StateRootTimeout {
        /// Target timestamp whose root was requested.
        target: Timestamp,
        /// Current time.
        now: Timestamp,
        /// Grace window in seconds.
        grace: u64,
    },
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
