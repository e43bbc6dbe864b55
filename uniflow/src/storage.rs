//! Key-value storage for schedule, tasks, and preferences.
//!
//! Each record lives in its own JSON file named after its fixed key inside the
//! data directory:
//!
//! | Record | Key | File |
//! |--------|-----|------|
//! | schedule | `unisync_schedule` | `unisync_schedule.json` |
//! | tasks | `unisync_tasks` | `unisync_tasks.json` |
//! | preferences | `unisync_prefs` | `unisync_prefs.json` |
//!
//! Loading never fails: a missing record yields its default, and a corrupt
//! record is logged and replaced by its default. Saving writes a temporary
//! file and renames it into place so readers never observe a partial record.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{AppState, ClassSession, Preferences, Task};

/// Storage key for the class schedule.
pub const SCHEDULE_KEY: &str = "unisync_schedule";

/// Storage key for the task list.
pub const TASKS_KEY: &str = "unisync_tasks";

/// Storage key for user preferences.
pub const PREFERENCES_KEY: &str = "unisync_prefs";

/// Errors that can occur while writing records.
#[derive(Error, Debug)]
pub enum StorageError {
    /// File system I/O error.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record could not be serialized.
    #[error("storage serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One of the three stored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Record {
    Schedule,
    Tasks,
    Preferences,
}

impl Record {
    pub const ALL: [Record; 3] = [Record::Schedule, Record::Tasks, Record::Preferences];

    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Record::Schedule => SCHEDULE_KEY,
            Record::Tasks => TASKS_KEY,
            Record::Preferences => PREFERENCES_KEY,
        }
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.json", self.key())
    }

    /// Maps a path inside the data directory back to its record.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Record> {
        let name = path.file_name()?.to_str()?;
        Record::ALL
            .into_iter()
            .find(|record| record.file_name() == name)
    }
}

/// File-backed record store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, record: Record) -> PathBuf {
        self.dir.join(record.file_name())
    }

    #[must_use]
    pub fn load_schedule(&self) -> Vec<ClassSession> {
        self.load_record(Record::Schedule)
    }

    #[must_use]
    pub fn load_tasks(&self) -> Vec<Task> {
        self.load_record(Record::Tasks)
    }

    /// Loads preferences, filling fields missing from the stored record
    /// (including nested notification settings) with defaults.
    #[must_use]
    pub fn load_preferences(&self) -> Preferences {
        let Some(value) = self.read_value(Record::Preferences) else {
            return Preferences::default();
        };

        match serde_json::from_value(strip_nulls(value)) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(
                    key = PREFERENCES_KEY,
                    error = %e,
                    "Stored preferences are malformed, using defaults"
                );
                Preferences::default()
            }
        }
    }

    /// Loads all three records.
    #[must_use]
    pub fn load_state(&self) -> AppState {
        AppState {
            schedule: self.load_schedule(),
            tasks: self.load_tasks(),
            preferences: self.load_preferences(),
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    pub fn save_schedule(&self, schedule: &[ClassSession]) -> Result<(), StorageError> {
        self.save_record(Record::Schedule, &schedule)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    pub fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        self.save_record(Record::Tasks, &tasks)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    pub fn save_preferences(&self, prefs: &Preferences) -> Result<(), StorageError> {
        self.save_record(Record::Preferences, prefs)
    }

    /// Removes every stored record. Missing records are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a record exists but cannot be removed.
    pub fn clear(&self) -> Result<(), StorageError> {
        for record in Record::ALL {
            match fs::remove_file(self.path_for(record)) {
                Ok(()) => debug!(key = record.key(), "Removed stored record"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn load_record<T: DeserializeOwned + Default>(&self, record: Record) -> T {
        let Some(value) = self.read_value(record) else {
            return T::default();
        };

        match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    key = record.key(),
                    error = %e,
                    "Stored record is malformed, using defaults"
                );
                T::default()
            }
        }
    }

    fn read_value(&self, record: Record) -> Option<Value> {
        let path = self.path_for(record);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read stored record");
                return None;
            }
        };

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    key = record.key(),
                    error = %e,
                    "Stored record is not valid JSON, using defaults"
                );
                None
            }
        }
    }

    fn save_record<T: Serialize + ?Sized>(
        &self,
        record: Record,
        value: &T,
    ) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string_pretty(value)?;
        let path = self.path_for(record);
        let tmp_path = path.with_extension("json.tmp");

        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;

        debug!(key = record.key(), path = %path.display(), "Saved record");
        Ok(())
    }
}

/// Drops `null` object members so they fall back to defaults on
/// deserialization.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        other => other,
    }
}
