//! Wall-clock helpers for the reward epoch schedule.

use colla_rewards::{EpochClock, LinearEpochClock};
use colla_types::{Epoch, Timestamp};

use crate::config::EpochConfig;

/// Current Unix time in seconds.
pub fn unix_now() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Build the epoch clock from configuration.
pub fn clock(config: &EpochConfig) -> LinearEpochClock {
    LinearEpochClock::new(config.genesis_timestamp, config.epoch_duration_secs)
}

/// Epoch containing `now`, or `None` before genesis.
pub fn current_epoch(clock: &LinearEpochClock, now: Timestamp) -> Option<Epoch> {
    clock.epoch_at(now)
}

/// Seconds until the epoch after the one containing `now` begins.
pub fn seconds_until_next_epoch(clock: &LinearEpochClock, now: Timestamp) -> Option<u64> {
    let next = current_epoch(clock, now)?.checked_add(1)?;
    clock.time_at(next).ok().map(|start| start - now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_epoch() {
        let clock = clock(&EpochConfig {
            genesis_timestamp: 1_000,
            epoch_duration_secs: 100,
        });
        assert_eq!(current_epoch(&clock, 999), None);
        assert_eq!(current_epoch(&clock, 1_000), Some(0));
        assert_eq!(current_epoch(&clock, 1_250), Some(2));
    }

    #[test]
    fn test_seconds_until_next() {
        let clock = LinearEpochClock::new(0, 100);
        assert_eq!(seconds_until_next_epoch(&clock, 250), Some(50));
        assert_eq!(seconds_until_next_epoch(&clock, 300), Some(100));
    }

    #[test]
    fn test_unix_now_is_recent() {
        // After 2023-11-14.
        assert!(unix_now() > 1_700_000_000);
    }
}
