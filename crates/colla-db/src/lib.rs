//! # colla-db
//!
//! Database access layer for the Colla daemon.
//! Manages the single SQLite database at `$COLLA_DATA_DIR/colla.db`.
//!
//! ## Schema
//!
//! - WAL mode, foreign keys enforced
//! - Timestamps and epochs stored as INTEGER
//! - Addresses stored as 20-byte BLOBs
//! - Token and share amounts (`u128`) stored as decimal TEXT
//! - Schema version stored in `PRAGMA user_version`
//!
//! ## Modules
//!
//! - [`schema`] — SQL schema definitions
//! - [`migrations`] — Forward-only migrations keyed on `user_version`
//! - [`queries`] — Per-table reads and writes
//! - [`restore`] — Rebuild in-memory state from the database

pub mod migrations;
pub mod queries;
pub mod restore;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

use colla_types::{Address, Amount};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored rows could not be replayed into domain state.
    #[error("restore failed: {0}")]
    Restore(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the Colla database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

pub(crate) fn amount_to_sql(amount: Amount) -> String {
    amount.to_string()
}

pub(crate) fn amount_from_sql(text: &str) -> Result<Amount> {
    text.parse()
        .map_err(|e: std::num::ParseIntError| DbError::Serialization(format!("amount '{text}': {e}")))
}

pub(crate) fn address_from_sql(bytes: &[u8]) -> Result<Address> {
    <[u8; 20]>::try_from(bytes)
        .map(Address::from)
        .map_err(|_| DbError::Serialization(format!("address of {} bytes", bytes.len())))
}
