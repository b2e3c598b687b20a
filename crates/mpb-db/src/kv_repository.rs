//! Key/value repository over the `kv` table.
//!
//! Holds the small pieces of shared state that every slot reads before it
//! decides anything: the active profile marker, the four slot residency keys
//! and the rotation cursor.

use rusqlite::{params, OptionalExtension};

use crate::{Db, DbError};

const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', 'now')";

pub struct KvRepository<'a> {
    db: &'a Db,
}

impl<'a> KvRepository<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Returns the stored value; a missing key and a NULL value both read as `None`.
    pub fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        let value: Option<Option<String>> = self
            .db
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value.flatten())
    }

    /// Unconditional overwrite (last writer wins).
    pub fn put(&self, key: &str, value: Option<&str>) -> Result<(), DbError> {
        self.db.conn().execute(
            &format!(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, {NOW_SQL})
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"
            ),
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<bool, DbError> {
        let rows = self
            .db
            .conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    /// Writes `new` only if the current value still equals `expected`.
    ///
    /// Returns false when another writer got there first; callers re-read and retry.
    pub fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, DbError> {
        let updated = self.db.conn().execute(
            &format!(
                "UPDATE kv SET value = ?1, updated_at = {NOW_SQL} WHERE key = ?2 AND value IS ?3"
            ),
            params![new, key, expected],
        )?;
        if updated == 1 {
            return Ok(true);
        }
        if expected.is_none() {
            let inserted = self.db.conn().execute(
                "INSERT OR IGNORE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, new],
            )?;
            return Ok(inserted == 1);
        }
        Ok(false)
    }
}
