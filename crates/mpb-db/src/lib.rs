//! mpb-db: SQLite storage + migration engine for the profile slot manager.
//!
//! The database file is the shared, process-external medium every slot reads
//! and writes. Writes are last-writer-wins; nothing here assumes that another
//! slot has not changed a row since the last read.

pub mod kv_repository;
pub mod profile_repository;
pub mod slot_repository;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

include!(concat!(env!("OUT_DIR"), "/migrations.rs"));

/// Crate identity label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "mpb-db"
}

#[derive(Debug, Clone)]
pub struct Config {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Config {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug)]
pub struct Db {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: i32,
    pub description: String,
    pub applied: bool,
    pub applied_at: String,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("open database: {0}")]
    Open(rusqlite::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("migration {version} missing {direction} sql")]
    MissingSQL {
        version: i32,
        direction: &'static str,
    },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Transaction(String),
    #[error("profile not found")]
    ProfileNotFound,
    #[error("profile already exists")]
    ProfileAlreadyExists,
    #[error("invalid slot: {0}")]
    InvalidSlot(String),
    #[error("rotation cursor contended after {attempts} attempts")]
    RotationContention { attempts: usize },
}

impl Db {
    pub fn open(cfg: Config) -> Result<Self, DbError> {
        ensure_parent_dir(&cfg.path)?;
        let conn = Connection::open(&cfg.path).map_err(DbError::Open)?;
        conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))
            .map_err(DbError::Open)?;
        // Best-effort: ignore pragma errors on older SQLite builds.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        Ok(Self { conn })
    }

    /// Opens the database and applies all pending migrations.
    pub fn open_migrated(cfg: Config) -> Result<Self, DbError> {
        let mut db = Self::open(cfg)?;
        db.migrate_up()?;
        Ok(db)
    }

    pub fn migrate_up(&mut self) -> Result<usize, DbError> {
        self.ensure_schema_version_table()?;
        let current = self.schema_version()?;

        let mut applied = 0usize;
        for m in MIGRATIONS {
            if m.version <= current {
                continue;
            }
            if m.up_sql.is_empty() {
                return Err(DbError::MissingSQL {
                    version: m.version,
                    direction: "up",
                });
            }

            let tx = self.conn.transaction()?;
            tx.execute_batch(m.up_sql)?;
            tx.execute(
                "INSERT INTO schema_version (version, description) VALUES (?1, ?2)",
                params![m.version, m.description],
            )?;
            tx.commit()?;
            applied += 1;
        }
        Ok(applied)
    }

    pub fn migrate_down(&mut self, steps: i32) -> Result<usize, DbError> {
        self.ensure_schema_version_table()?;
        let current = self.schema_version()?;
        if current == 0 || steps <= 0 {
            return Ok(0);
        }

        let to_rollback: Vec<EmbeddedMigration> = MIGRATIONS
            .iter()
            .rev()
            .filter(|m| m.version <= current)
            .take(steps as usize)
            .copied()
            .collect();

        let mut rolled_back = 0usize;
        for m in to_rollback {
            if m.down_sql.is_empty() {
                return Err(DbError::MissingSQL {
                    version: m.version,
                    direction: "down",
                });
            }

            let tx = self.conn.transaction()?;
            tx.execute_batch(m.down_sql)?;
            tx.execute(
                "DELETE FROM schema_version WHERE version = ?1",
                params![m.version],
            )?;
            tx.commit()?;
            rolled_back += 1;
        }

        Ok(rolled_back)
    }

    pub fn migration_status(&mut self) -> Result<Vec<MigrationStatus>, DbError> {
        self.ensure_schema_version_table()?;

        let mut applied_at: BTreeMap<i32, String> = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT version, applied_at FROM schema_version ORDER BY version")?;
        let rows = stmt.query_map([], |row| {
            let version: i32 = row.get(0)?;
            let stamp: String = row.get(1)?;
            Ok((version, stamp))
        })?;
        for row in rows {
            let (version, stamp) = row?;
            applied_at.insert(version, stamp);
        }

        let mut status = Vec::with_capacity(MIGRATIONS.len());
        for m in MIGRATIONS {
            let stamp = applied_at.get(&m.version).cloned().unwrap_or_default();
            status.push(MigrationStatus {
                version: m.version,
                description: m.description.to_string(),
                applied: applied_at.contains_key(&m.version),
                applied_at: stamp,
            });
        }
        Ok(status)
    }

    pub fn schema_version(&self) -> Result<i32, DbError> {
        self.ensure_schema_version_table()?;
        let version: Option<i32> = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.unwrap_or(0))
    }

    fn ensure_schema_version_table(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (\n\
                version INTEGER PRIMARY KEY,\n\
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),\n\
                description TEXT\n\
             );",
        )?;
        Ok(())
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Executes `f` inside a SQLite transaction: rollback on error, commit on success.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let tx = self.conn.transaction()?;

        match f(&tx) {
            Ok(v) => {
                tx.commit()?;
                Ok(v)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    return Err(DbError::Transaction(format!(
                        "rollback failed: {rb} (original error: {e})"
                    )));
                }
                Err(e)
            }
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), DbError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "mpb-db-lib-{tag}-{nanos}-{}.sqlite",
            std::process::id()
        ))
    }

    #[test]
    fn crate_label_is_stable() {
        assert_eq!(crate_label(), "mpb-db");
    }

    #[test]
    fn embedded_migrations_are_ordered_and_complete() {
        assert!(!MIGRATIONS.is_empty());
        let mut last = 0;
        for m in MIGRATIONS {
            assert!(m.version > last, "versions must increase");
            assert!(!m.up_sql.is_empty(), "migration {} missing up", m.version);
            assert!(!m.down_sql.is_empty(), "migration {} missing down", m.version);
            last = m.version;
        }
    }

    #[test]
    fn migrate_up_then_down_returns_to_zero() {
        let path = temp_path("updown");
        let mut db = Db::open(Config::new(&path)).unwrap();
        let applied = db.migrate_up().unwrap();
        assert_eq!(applied, MIGRATIONS.len());
        assert_eq!(db.migrate_up().unwrap(), 0, "second run is a no-op");

        let status = db.migration_status().unwrap();
        assert!(status.iter().all(|s| s.applied));

        let rolled = db.migrate_down(MIGRATIONS.len() as i32).unwrap();
        assert_eq!(rolled, MIGRATIONS.len());
        assert_eq!(db.schema_version().unwrap(), 0);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let path = temp_path("tx");
        let mut db = Db::open_migrated(Config::new(&path)).unwrap();
        let result: Result<(), DbError> = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO kv (key, value) VALUES ('probe', 'x')",
                [],
            )?;
            Err(DbError::Validation("boom".into()))
        });
        assert!(result.is_err());
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM kv WHERE key = 'probe'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
        let _ = std::fs::remove_file(path);
    }
}
