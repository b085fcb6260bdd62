//! Treasury account query functions.

use rusqlite::Connection;

use colla_rewards::{Treasury, TreasuryAccount};

use crate::{address_from_sql, amount_from_sql, amount_to_sql, Result};

/// Write every account of `treasury`, replacing stored values.
pub fn save(conn: &Connection, treasury: &Treasury) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO treasury_accounts (address, pending, escrow, balance)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (address, account) in treasury.accounts() {
        stmt.execute(rusqlite::params![
            address.as_slice(),
            amount_to_sql(account.pending),
            amount_to_sql(account.escrow),
            amount_to_sql(account.balance),
        ])?;
    }
    Ok(())
}

/// Load the treasury; empty if nothing was saved.
pub fn load(conn: &Connection) -> Result<Treasury> {
    let mut stmt = conn.prepare("SELECT address, pending, escrow, balance FROM treasury_accounts")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, Vec<u8>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut accounts = Vec::with_capacity(rows.len());
    for (address, pending, escrow, balance) in rows {
        accounts.push((
            address_from_sql(&address)?,
            TreasuryAccount {
                pending: amount_from_sql(&pending)?,
                escrow: amount_from_sql(&escrow)?,
                balance: amount_from_sql(&balance)?,
            },
        ));
    }
    Ok(Treasury::from_accounts(accounts))
}
