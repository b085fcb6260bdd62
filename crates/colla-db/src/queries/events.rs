//! Event log query functions.

use rusqlite::Connection;

use colla_types::events::Event;

use crate::{DbError, Result};

/// Append an event, returning its log id.
pub fn append(conn: &Connection, event: &Event) -> Result<i64> {
    let payload = serde_json::to_string(event).map_err(|e| DbError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT INTO events (kind, validator, payload) VALUES (?1, ?2, ?3)",
        rusqlite::params![event.kind(), event.validator().as_slice(), payload],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Events with id greater than `after`, oldest first, at most `limit`.
pub fn since(conn: &Connection, after: i64, limit: u32) -> Result<Vec<(i64, Event)>> {
    let mut stmt = conn.prepare(
        "SELECT id, payload FROM events WHERE id > ?1 ORDER BY id LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![after, limit], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut events = Vec::with_capacity(rows.len());
    for (id, payload) in rows {
        let event: Event =
            serde_json::from_str(&payload).map_err(|e| DbError::Serialization(e.to_string()))?;
        events.push((id, event));
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colla_types::Address;

    #[test]
    fn test_append_and_page() {
        let conn = crate::open_memory().expect("open");
        let v = Address::repeat_byte(1);
        for epoch in 1..=3 {
            append(
                &conn,
                &Event::EpochFinalized {
                    validator: v,
                    epoch,
                    total_reward: u128::MAX,
                    total_twab: 10,
                },
            )
            .expect("append");
        }

        let first = since(&conn, 0, 2).expect("page 1");
        assert_eq!(first.len(), 2);
        let rest = since(&conn, first[1].0, 10).expect("page 2");
        assert_eq!(rest.len(), 1);
        assert!(matches!(rest[0].1, Event::EpochFinalized { epoch: 3, .. }));
    }
}
