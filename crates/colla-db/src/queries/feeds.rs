//! Oracle feed query functions.

use rusqlite::Connection;

use colla_types::{Address, OwnershipEntry, Timestamp, ValidatorSnapshot};

use crate::{address_from_sql, amount_from_sql, amount_to_sql, Result};

/// A stored feed with its ownership list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredFeed {
    pub validator: Address,
    pub timestamp: Timestamp,
    pub index: u64,
    pub snapshot: ValidatorSnapshot,
    pub ownerships: Vec<OwnershipEntry>,
}

/// Insert a feed and its ownership rows.
///
/// Callers wrap this in the same transaction as the in-memory mutation's
/// other side effects.
pub fn insert(conn: &Connection, feed: &StoredFeed) -> Result<()> {
    let validator = feed.validator.as_slice();
    conn.execute(
        "INSERT INTO feeds (validator, timestamp, feed_index, collateral_amount,
                            collateral_shares, voting_power, total_voting_power)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            validator,
            feed.timestamp as i64,
            feed.index as i64,
            amount_to_sql(feed.snapshot.collateral_amount),
            amount_to_sql(feed.snapshot.collateral_shares),
            amount_to_sql(feed.snapshot.voting_power),
            amount_to_sql(feed.snapshot.total_voting_power),
        ],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO feed_ownerships (validator, timestamp, position, owner, shares)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, entry) in feed.ownerships.iter().enumerate() {
        stmt.execute(rusqlite::params![
            validator,
            feed.timestamp as i64,
            position as i64,
            entry.owner.as_slice(),
            amount_to_sql(entry.shares),
        ])?;
    }
    Ok(())
}

type FeedRow = (Vec<u8>, i64, i64, String, String, String, String);

/// Every stored feed in insertion order.
pub fn load_all(conn: &Connection) -> Result<Vec<StoredFeed>> {
    let mut stmt = conn.prepare(
        "SELECT validator, timestamp, feed_index, collateral_amount, collateral_shares,
                voting_power, total_voting_power
         FROM feeds ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<FeedRow>, _>>()?;

    let mut owner_stmt = conn.prepare(
        "SELECT owner, shares FROM feed_ownerships
         WHERE validator = ?1 AND timestamp = ?2 ORDER BY position",
    )?;

    let mut feeds = Vec::with_capacity(rows.len());
    for (validator, timestamp, index, amount, shares, power, total_power) in rows {
        let owner_rows = owner_stmt
            .query_map(rusqlite::params![validator, timestamp], |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut ownerships = Vec::with_capacity(owner_rows.len());
        for (owner, shares) in &owner_rows {
            ownerships.push(OwnershipEntry::new(
                address_from_sql(owner)?,
                amount_from_sql(shares)?,
            ));
        }

        feeds.push(StoredFeed {
            validator: address_from_sql(&validator)?,
            timestamp: timestamp as u64,
            index: index as u64,
            snapshot: ValidatorSnapshot {
                collateral_amount: amount_from_sql(&amount)?,
                collateral_shares: amount_from_sql(&shares)?,
                voting_power: amount_from_sql(&power)?,
                total_voting_power: amount_from_sql(&total_power)?,
            },
            ownerships,
        });
    }
    Ok(feeds)
}

/// Number of stored feeds.
pub fn count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM feeds", [], |row| row.get(0))?;
    Ok(count as u64)
}
