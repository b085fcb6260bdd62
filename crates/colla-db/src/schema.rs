//! SQL schema definitions.

/// Complete schema for Colla v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Collateral oracle feeds
-- ============================================================

-- One row per stored feed. Rows are replayed in rowid order on restore,
-- which preserves both per-validator timestamp order and first-feed order.
CREATE TABLE IF NOT EXISTS feeds (
    validator BLOB NOT NULL,
    timestamp INTEGER NOT NULL,
    feed_index INTEGER NOT NULL,
    collateral_amount TEXT NOT NULL,
    collateral_shares TEXT NOT NULL,
    voting_power TEXT NOT NULL,
    total_voting_power TEXT NOT NULL,
    PRIMARY KEY (validator, timestamp)
);

CREATE TABLE IF NOT EXISTS feed_ownerships (
    validator BLOB NOT NULL,
    timestamp INTEGER NOT NULL,
    position INTEGER NOT NULL,
    owner BLOB NOT NULL,
    shares TEXT NOT NULL,
    PRIMARY KEY (validator, timestamp, position),
    FOREIGN KEY (validator, timestamp) REFERENCES feeds(validator, timestamp) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_feed_ownerships_owner ON feed_ownerships(owner);

-- ============================================================
-- Reward router
-- ============================================================

CREATE TABLE IF NOT EXISTS epoch_rewards (
    validator BLOB NOT NULL,
    epoch INTEGER NOT NULL,
    total_reward TEXT NOT NULL,
    total_twab TEXT NOT NULL,
    finalized INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (validator, epoch)
);

-- Config bodies are stored as JSON.
CREATE TABLE IF NOT EXISTS distribution_configs (
    validator BLOB NOT NULL,
    effective_epoch INTEGER NOT NULL,
    config TEXT NOT NULL,
    PRIMARY KEY (validator, effective_epoch)
);

CREATE TABLE IF NOT EXISTS claims (
    validator BLOB NOT NULL,
    vault BLOB NOT NULL,
    epoch INTEGER NOT NULL,
    gross TEXT NOT NULL,
    PRIMARY KEY (validator, vault, epoch)
);

CREATE TABLE IF NOT EXISTS treasury_accounts (
    address BLOB PRIMARY KEY,
    pending TEXT NOT NULL DEFAULT '0',
    escrow TEXT NOT NULL DEFAULT '0',
    balance TEXT NOT NULL DEFAULT '0'
);

-- ============================================================
-- Event log
-- ============================================================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    validator BLOB NOT NULL,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_validator ON events(validator);
"#;
