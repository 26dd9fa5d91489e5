//! SQLite-backed [`Ledger`].

use crate::{lock, SharedConnection, StoreError};
use chrono::NaiveDate;
use rollcall_core::{
    AttendanceRecord, AttendanceStatus, Identity, Ledger, LedgerError, LedgerOutcome,
    RecordFilter,
};
use rusqlite::params;

/// Attendance ledger over the `attendance` table.
///
/// Deduplication is the table's `UNIQUE (roll, date)` constraint combined
/// with `INSERT OR IGNORE`, so the check and the insert are one statement.
pub struct SqliteLedger {
    conn: SharedConnection,
}

impl SqliteLedger {
    pub(crate) fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn insert(&self, identity: &Identity, date: NaiveDate) -> Result<LedgerOutcome, StoreError> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO attendance (roll, display_name, date, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.roll,
                identity.display_name,
                date.to_string(),
                AttendanceStatus::Present.as_str()
            ],
        )?;

        if changed == 1 {
            tracing::info!(roll = %identity.roll, %date, "marked present");
            Ok(LedgerOutcome::Inserted)
        } else {
            tracing::debug!(roll = %identity.roll, %date, "already marked present");
            Ok(LedgerOutcome::AlreadyPresent)
        }
    }

    fn select(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT roll, display_name, date, status FROM attendance
             WHERE (?1 IS NULL OR roll = ?1) AND (?2 IS NULL OR date = ?2)
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(
                params![filter.roll, filter.date.map(|d| d.to_string())],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(roll, display_name, date, status)| {
                let date = date
                    .parse::<NaiveDate>()
                    .map_err(|e| StoreError::Corrupt(format!("date {date:?}: {e}")))?;
                let status = status.parse::<AttendanceStatus>().map_err(StoreError::Corrupt)?;
                Ok(AttendanceRecord {
                    identity: Identity { roll, display_name },
                    date,
                    status,
                })
            })
            .collect()
    }
}

impl Ledger for SqliteLedger {
    fn record_presence(
        &self,
        identity: &Identity,
        date: NaiveDate,
    ) -> Result<LedgerOutcome, LedgerError> {
        Ok(self.insert(identity, date)?)
    }

    fn list_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>, LedgerError> {
        Ok(self.select(filter)?)
    }
}
