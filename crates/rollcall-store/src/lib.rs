//! rollcall-store — SQLite persistence for the roster and attendance ledger.
//!
//! One [`Store`] owns one connection. [`SqliteRoster`] and [`SqliteLedger`]
//! share it; the connection closes when the last of them is dropped.
//!
//! # Schema
//!
//! `identities(roll, display_name, vector, enrolled_at)` holds one row per
//! enrolled identity; `vector` is a JSON array or NULL when registration
//! produced no face.
//!
//! `attendance(id, roll, display_name, date, status)` is append-only with a
//! `UNIQUE (roll, date)` constraint, so duplicate presence records are
//! impossible even across processes sharing the file.

pub mod ledger;
pub mod roster;

pub use ledger::SqliteLedger;
pub use roster::SqliteRoster;

use rollcall_core::LedgerError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("vector for {roll} has dimension {actual}, enrolled references have {expected}")]
    DimensionMismatch {
        roll: String,
        expected: usize,
        actual: usize,
    },
    #[error("vector for {roll} contains non-finite components")]
    NonFinite { roll: String },
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("connection lock poisoned")]
    Poisoned,
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Poisoned => LedgerError::Poisoned,
            other => LedgerError::Backend(Box::new(other)),
        }
    }
}

/// Row counts for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub identities: usize,
    pub unreferenced: usize,
    pub records: usize,
}

pub(crate) type SharedConnection = Arc<Mutex<Connection>>;

pub(crate) fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock().map_err(|_| StoreError::Poisoned)
}

/// Handle to an opened attendance database.
#[derive(Clone)]
pub struct Store {
    conn: SharedConnection,
}

impl Store {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "database opened");

        Self::from_connection(conn)
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn roster(&self) -> SqliteRoster {
        SqliteRoster::new(Arc::clone(&self.conn))
    }

    pub fn ledger(&self) -> SqliteLedger {
        SqliteLedger::new(Arc::clone(&self.conn))
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = lock(&self.conn)?;
        let count = |sql: &str| -> Result<usize, StoreError> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(StoreStats {
            identities: count("SELECT COUNT(*) FROM identities")?,
            unreferenced: count("SELECT COUNT(*) FROM identities WHERE vector IS NULL")?,
            records: count("SELECT COUNT(*) FROM attendance")?,
        })
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS identities (
            roll TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            vector TEXT,
            enrolled_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS attendance (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            roll TEXT NOT NULL,
            display_name TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            UNIQUE (roll, date)
        );
        CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rollcall_core::{FeatureVector, Identity, Ledger, LedgerOutcome, RecordFilter};

    #[test]
    fn test_stats_counts_rows() {
        let store = Store::open_in_memory().unwrap();
        let roster = store.roster();
        roster
            .enroll(&Identity::new("001", "Alice"), Some(&FeatureVector::new(vec![1.0, 0.0])))
            .unwrap();
        roster.enroll(&Identity::new("002", "Bob"), None).unwrap();
        store
            .ledger()
            .record_presence(
                &Identity::new("001", "Alice"),
                NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            )
            .unwrap();

        assert_eq!(
            store.stats().unwrap(),
            StoreStats {
                identities: 2,
                unreferenced: 1,
                records: 1,
            }
        );
    }

    #[test]
    fn test_file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/attendance.db");
        let date = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let alice = Identity::new("001", "Alice");

        {
            let store = Store::open(&path).unwrap();
            store
                .roster()
                .enroll(&alice, Some(&FeatureVector::new(vec![0.5, 0.5])))
                .unwrap();
            assert_eq!(
                store.ledger().record_presence(&alice, date).unwrap(),
                LedgerOutcome::Inserted
            );
        }

        {
            let store = Store::open(&path).unwrap();
            assert_eq!(store.roster().entries().unwrap().len(), 1);
            assert_eq!(
                store.ledger().record_presence(&alice, date).unwrap(),
                LedgerOutcome::AlreadyPresent
            );
            assert_eq!(store.ledger().list_records(&RecordFilter::default()).unwrap().len(), 1);
        }
    }
}
