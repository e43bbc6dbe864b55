//! Backup export of the schedule and tasks.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{AppState, ClassSession, Task};

/// A backup document. Preferences are not included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub schedule: Vec<ClassSession>,
    pub tasks: Vec<Task>,
    /// ISO 8601 UTC timestamp, e.g. `2024-01-15T08:30:00.000Z`.
    pub exported_at: String,
}

impl ExportDocument {
    #[must_use]
    pub fn new(state: &AppState, at: DateTime<Utc>) -> Self {
        Self {
            schedule: state.schedule.clone(),
            tasks: state.tasks.clone(),
            exported_at: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Pretty-printed JSON with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Default backup file name for `date`: `unisync-backup-YYYY-MM-DD.json`.
#[must_use]
pub fn default_file_name(date: NaiveDate) -> String {
    format!("unisync-backup-{}.json", date.format("%Y-%m-%d"))
}

/// Writes a backup of `state` to `output`, or to the default file name in
/// `dir` when `output` is `None`. Returns the written path.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written.
pub fn write_backup(
    state: &AppState,
    output: Option<&Path>,
    dir: &Path,
    at: DateTime<Utc>,
) -> io::Result<PathBuf> {
    let document = ExportDocument::new(state, at);
    let path = output.map_or_else(
        || dir.join(default_file_name(at.date_naive())),
        Path::to_path_buf,
    );

    let json = document
        .to_json()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    std::fs::write(&path, json)?;

    info!(
        path = %path.display(),
        classes = document.schedule.len(),
        tasks = document.tasks.len(),
        "Backup exported"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap()
    }

    #[test]
    fn file_name_uses_export_date() {
        assert_eq!(
            default_file_name(at().date_naive()),
            "unisync-backup-2024-01-15.json"
        );
    }

    #[test]
    fn document_has_expected_shape() {
        let json = ExportDocument::new(&AppState::default(), at()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["exportedAt"], "2024-01-15T08:30:00.000Z");
        assert!(value["schedule"].as_array().unwrap().is_empty());
        assert!(value.get("preferences").is_none());
        assert!(json.contains("\n  \"schedule\""));
    }

    #[test]
    fn backup_defaults_to_dated_file() {
        let dir = TempDir::new().unwrap();
        let path = write_backup(&AppState::default(), None, dir.path(), at()).unwrap();

        assert!(path.ends_with("unisync-backup-2024-01-15.json"));
        assert!(path.exists());
    }
}
