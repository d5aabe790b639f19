//! Detection log storage.
//!
//! Stores are append-only from the tracker's point of view: an opened
//! interval is inserted once with null close fields, then closed once.
//! Both operations are idempotent so the pipeline can retry a failed write
//! without re-running the tracker.

pub mod jsonl;
pub mod memory;
pub mod record;

pub use jsonl::JsonlLogStore;
pub use memory::MemoryLogStore;
pub use record::{LogRecord, RecordMapper, TIME_OF_DAY_FORMAT};

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Interval persistence and query by date.
pub trait LogStore: Send + Sync {
    /// Insert a record for a newly opened interval.
    fn insert(&self, record: &LogRecord) -> Result<(), StoreError>;

    /// Set the close fields on the record with the given id.
    fn close(&self, id: Uuid, closed_at: DateTime<Utc>, close_time: &str)
        -> Result<(), StoreError>;

    /// Replace the description of an open record.
    fn set_description(&self, id: Uuid, description: &str) -> Result<(), StoreError>;

    /// All records in insertion order.
    fn all(&self) -> Result<Vec<LogRecord>, StoreError>;

    /// Records detected on `date`.
    fn by_date(&self, date: NaiveDate) -> Result<Vec<LogRecord>, StoreError> {
        Ok(self.all()?.into_iter().filter(|r| r.date == date).collect())
    }

    /// Records that have not been closed.
    fn open_records(&self) -> Result<Vec<LogRecord>, StoreError> {
        Ok(self.all()?.into_iter().filter(|r| r.is_open()).collect())
    }
}

/// Thread-safe shared log store.
pub type SharedLogStore = Arc<dyn LogStore>;

/// Log store errors.
#[derive(Debug)]
pub enum StoreError {
    Io(String),
    Serialization(String),
    /// No record with this id
    NotFound(Uuid),
    /// The record was already closed at a different time
    AlreadyClosed(Uuid),
    /// Another record with this id has different contents
    Conflict(Uuid),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "Store IO error: {e}"),
            StoreError::Serialization(e) => write!(f, "Store serialization error: {e}"),
            StoreError::NotFound(id) => write!(f, "No log record with id {id}"),
            StoreError::AlreadyClosed(id) => write!(f, "Log record {id} is already closed"),
            StoreError::Conflict(id) => write!(f, "Conflicting log record for id {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Whether inserting `record` would add it to `records`.
///
/// An identical record already present means there is nothing to do.
pub(crate) fn check_insert(records: &[LogRecord], record: &LogRecord) -> Result<bool, StoreError> {
    match records.iter().find(|r| r.id == record.id) {
        Some(existing) if existing.opened_at == record.opened_at => Ok(false),
        Some(_) => Err(StoreError::Conflict(record.id)),
        None => Ok(true),
    }
}

/// Apply an insert to an in-memory record list.
///
/// Re-inserting an identical record is accepted and leaves the list as is.
pub(crate) fn apply_insert(records: &mut Vec<LogRecord>, record: &LogRecord) -> Result<bool, StoreError> {
    let added = check_insert(records, record)?;
    if added {
        records.push(record.clone());
    }
    Ok(added)
}

/// Apply a description update to an in-memory record list.
///
/// Only open records may change; setting the current value again is a no-op.
pub(crate) fn apply_description(
    records: &mut [LogRecord],
    id: Uuid,
    description: &str,
) -> Result<bool, StoreError> {
    let record = records
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or(StoreError::NotFound(id))?;

    if record.description == description {
        return Ok(false);
    }
    if !record.is_open() {
        return Err(StoreError::AlreadyClosed(id));
    }
    record.description = description.to_string();
    Ok(true)
}

/// Apply a close to an in-memory record list.
///
/// Closing again with the same instant is accepted and changes nothing.
pub(crate) fn apply_close(
    records: &mut [LogRecord],
    id: Uuid,
    closed_at: DateTime<Utc>,
    close_time: &str,
) -> Result<bool, StoreError> {
    let record = records
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or(StoreError::NotFound(id))?;

    match record.closed_at {
        Some(existing) if existing == closed_at => Ok(false),
        Some(_) => Err(StoreError::AlreadyClosed(id)),
        None => {
            record.closed_at = Some(closed_at);
            record.close_time = Some(close_time.to_string());
            Ok(true)
        }
    }
}
