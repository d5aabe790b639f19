//! Append-only JSON Lines log store.
//!
//! Every write appends one line: an `opened` entry carrying the full record,
//! a `described` entry with a replacement description, or a `closed` entry
//! carrying the id and close fields. The current
//! state is rebuilt by replaying the file on open.

use super::{
    apply_close, apply_description, apply_insert, check_insert, LogRecord, LogStore, StoreError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// One line of the log file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum StoreEntry {
    Opened {
        record: LogRecord,
    },
    Described {
        id: Uuid,
        description: String,
    },
    Closed {
        id: Uuid,
        closed_at: DateTime<Utc>,
        close_time: String,
    },
}

/// File-backed log store.
#[derive(Debug)]
pub struct JsonlLogStore {
    path: PathBuf,
    records: Mutex<Vec<LogRecord>>,
}

impl JsonlLogStore {
    /// Open (or create) the log at `path`, replaying existing entries.
    ///
    /// Malformed lines are skipped with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let mut records = Vec::new();
        if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
            for (lineno, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let replayed = serde_json::from_str::<StoreEntry>(line)
                    .map_err(|e| StoreError::Serialization(e.to_string()))
                    .and_then(|entry| match entry {
                        StoreEntry::Opened { record } => apply_insert(&mut records, &record),
                        StoreEntry::Described { id, description } => {
                            apply_description(&mut records, id, &description)
                        }
                        StoreEntry::Closed {
                            id,
                            closed_at,
                            close_time,
                        } => apply_close(&mut records, id, closed_at, &close_time),
                    });
                if let Err(e) = replayed {
                    tracing::warn!("Skipping log line {} in {:?}: {}", lineno + 1, path, e);
                }
            }
            tracing::debug!("Loaded {} detection records from {:?}", records.len(), path);
        }

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &StoreEntry) -> Result<(), StoreError> {
        let mut line =
            serde_json::to_string(entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let len = file
            .metadata()
            .map_err(|e| StoreError::Io(e.to_string()))?
            .len();
        // Start on a fresh line after a torn write
        if len > 0 && !ends_with_newline(&mut file).map_err(|e| StoreError::Io(e.to_string()))? {
            line.insert(0, '\n');
        }

        if let Err(e) = file.write_all(line.as_bytes()) {
            if let Err(truncate) = file.set_len(len) {
                tracing::error!("Could not roll back partial write to {:?}: {truncate}", self.path);
            }
            return Err(StoreError::Io(e.to_string()));
        }
        Ok(())
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Index and copy of the record with `id`.
fn staged(records: &[LogRecord], id: Uuid) -> Result<(usize, LogRecord), StoreError> {
    records
        .iter()
        .position(|r| r.id == id)
        .map(|index| (index, records[index].clone()))
        .ok_or(StoreError::NotFound(id))
}

impl LogStore for JsonlLogStore {
    fn insert(&self, record: &LogRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        // Validate against the in-memory state before touching the file.
        if check_insert(&records, record)? {
            self.append(&StoreEntry::Opened {
                record: record.clone(),
            })?;
            records.push(record.clone());
        }
        Ok(())
    }

    fn close(
        &self,
        id: Uuid,
        closed_at: DateTime<Utc>,
        close_time: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let (index, mut record) = staged(&records, id)?;
        if apply_close(std::slice::from_mut(&mut record), id, closed_at, close_time)? {
            self.append(&StoreEntry::Closed {
                id,
                closed_at,
                close_time: close_time.to_string(),
            })?;
            records[index] = record;
        }
        Ok(())
    }

    fn set_description(&self, id: Uuid, description: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let (index, mut record) = staged(&records, id)?;
        if apply_description(std::slice::from_mut(&mut record), id, description)? {
            self.append(&StoreEntry::Described {
                id,
                description: description.to_string(),
            })?;
            records[index] = record;
        }
        Ok(())
    }

    fn all(&self) -> Result<Vec<LogRecord>, StoreError> {
        Ok(self.records.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}
