//! Store schema versions.
//!
//! # Responsibility
//! - Bring a connection up to the schema this binary writes.
//! - Check the rows the store relies on after every open.
//!
//! # Invariants
//! - Schema versions are applied in ascending order inside one transaction
//!   and mirrored to `PRAGMA user_version`.
//! - A store stamped with a newer version is refused, never downgraded.
//! - `store_meta.write_seq` exists once the schema is current; document
//!   writes draw `_seq` from it.

use crate::store::{StoreError, StoreResult};
use log::info;
use rusqlite::{Connection, OptionalExtension};

/// Ordered schema scripts; the index plus one is the version.
const SCHEMA_SCRIPTS: &[&str] = &[include_str!("0001_init.sql")];

/// Returns the schema version this binary writes.
pub fn latest_version() -> u32 {
    SCHEMA_SCRIPTS.len() as u32
}

/// Upgrades the schema to [`latest_version`] and checks store metadata.
pub fn apply_migrations(conn: &mut Connection) -> StoreResult<()> {
    let from: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let to = latest_version();

    if from > to {
        return Err(StoreError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: to,
        });
    }

    if from < to {
        let tx = conn.transaction()?;
        for (version, script) in (1..=to).zip(SCHEMA_SCRIPTS).skip(from as usize) {
            tx.execute_batch(script)?;
            tx.pragma_update(None, "user_version", version)?;
        }
        tx.commit()?;
        info!("event=store_migrate module=store status=ok from_version={from} to_version={to}");
    }

    verify_write_sequence(conn)
}

fn verify_write_sequence(conn: &Connection) -> StoreResult<()> {
    let seq: Option<i64> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'write_seq';",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match seq {
        Some(value) if value >= 0 => Ok(()),
        Some(value) => Err(StoreError::InvalidData(format!(
            "store_meta.write_seq is negative ({value})"
        ))),
        None => Err(StoreError::InvalidData(
            "store_meta.write_seq is missing".to_string(),
        )),
    }
}
