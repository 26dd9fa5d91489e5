//! Attendance ledger: append-only presence records, at most one per
//! (roll, date).

use crate::types::{AttendanceRecord, AttendanceStatus, Identity};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger lock poisoned")]
    Poisoned,
    #[error("ledger backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Outcome of [`Ledger::record_presence`]. Neither variant is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOutcome {
    Inserted,
    AlreadyPresent,
}

/// Optional narrowing for [`Ledger::list_records`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub roll: Option<String>,
    pub date: Option<NaiveDate>,
}

impl RecordFilter {
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.roll.as_deref().map_or(true, |r| record.identity.roll == r)
            && self.date.map_or(true, |d| record.date == d)
    }
}

/// Store of attendance records.
///
/// `record_presence` must be atomic per (roll, date): any number of
/// concurrent calls for the same key produce exactly one `Inserted`.
pub trait Ledger: Send + Sync {
    fn record_presence(
        &self,
        identity: &Identity,
        date: NaiveDate,
    ) -> Result<LedgerOutcome, LedgerError>;

    /// Records matching `filter`, in insertion order. Every call returns a
    /// fresh snapshot.
    fn list_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>, LedgerError>;
}

impl<L: Ledger + ?Sized> Ledger for std::sync::Arc<L> {
    fn record_presence(
        &self,
        identity: &Identity,
        date: NaiveDate,
    ) -> Result<LedgerOutcome, LedgerError> {
        (**self).record_presence(identity, date)
    }

    fn list_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>, LedgerError> {
        (**self).list_records(filter)
    }
}

#[derive(Default)]
struct MemoryInner {
    records: Vec<AttendanceRecord>,
    keys: HashSet<(String, NaiveDate)>,
}

/// In-process ledger. Check-then-insert runs under one mutex.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<MemoryInner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, LedgerError> {
        let inner = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(inner.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }
}

impl Ledger for MemoryLedger {
    fn record_presence(
        &self,
        identity: &Identity,
        date: NaiveDate,
    ) -> Result<LedgerOutcome, LedgerError> {
        let mut inner = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;

        if !inner.keys.insert((identity.roll.clone(), date)) {
            tracing::debug!(roll = %identity.roll, %date, "already marked present");
            return Ok(LedgerOutcome::AlreadyPresent);
        }

        inner.records.push(AttendanceRecord {
            identity: identity.clone(),
            date,
            status: AttendanceStatus::Present,
        });
        tracing::info!(roll = %identity.roll, %date, "marked present");
        Ok(LedgerOutcome::Inserted)
    }

    fn list_records(&self, filter: &RecordFilter) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let inner = self.inner.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(inner
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}
