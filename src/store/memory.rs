//! In-memory log store.

use super::{apply_close, apply_description, apply_insert, LogRecord, LogStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

/// Log store kept entirely in memory. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with records.
    pub fn with_records(records: Vec<LogRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogStore for MemoryLogStore {
    fn insert(&self, record: &LogRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        apply_insert(&mut records, record).map(|_| ())
    }

    fn close(
        &self,
        id: Uuid,
        closed_at: DateTime<Utc>,
        close_time: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        apply_close(&mut records, id, closed_at, close_time).map(|_| ())
    }

    fn set_description(&self, id: Uuid, description: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        apply_description(&mut records, id, description).map(|_| ())
    }

    fn all(&self) -> Result<Vec<LogRecord>, StoreError> {
        Ok(self.records.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}
