//! Schedule, task, and preference records.
//!
//! This module defines the records owned by the application state container.
//! All types serialize to camelCase JSON, the shape used both by stored
//! records and by exported backups.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDateTime, Weekday};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated record identifiers.
const RECORD_ID_LEN: usize = 7;

/// Theme applied when no preference has been stored.
pub const DEFAULT_THEME_ID: &str = "ocean";

/// Every selectable color theme.
pub const THEME_IDS: [&str; 5] = ["ocean", "violet", "emerald", "rose", "amber"];

/// Day of the week a class session repeats on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    /// All days in calendar order, Monday first.
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when a day name cannot be recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDay(pub String);

impl fmt::Display for UnknownDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown day of week: '{}'", self.0)
    }
}

impl std::error::Error for UnknownDay {}

impl FromStr for DayOfWeek {
    type Err = UnknownDay;

    /// Accepts full names and three-letter abbreviations, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        DayOfWeek::ALL
            .iter()
            .copied()
            .find(|day| {
                let name = day.as_str().to_ascii_lowercase();
                name == lower || name[..3] == lower
            })
            .ok_or_else(|| UnknownDay(s.to_string()))
    }
}

/// A weekly class session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSession {
    pub id: String,
    pub course_name: String,
    pub course_code: String,
    pub faculty: String,
    pub room: String,
    pub day: DayOfWeek,

    /// Start time as `HH:MM`, 24-hour clock.
    pub start_time: String,

    /// End time as `HH:MM`, 24-hour clock. Assumed later than `start_time`.
    pub end_time: String,

    /// Display colour kept from imported records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ClassSession {
    /// Minutes since midnight at which the session starts.
    ///
    /// Returns `None` when `start_time` is not a valid `HH:MM` value.
    #[must_use]
    pub fn start_minutes(&self) -> Option<u32> {
        parse_hhmm(&self.start_time).map(|(h, m)| h * 60 + m)
    }

    /// Minutes since midnight at which the session ends.
    #[must_use]
    pub fn end_minutes(&self) -> Option<u32> {
        parse_hhmm(&self.end_time).map(|(h, m)| h * 60 + m)
    }

    /// Label used in reminder text: the course name, or the code when the
    /// name is blank.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.course_name.trim().is_empty() {
            &self.course_code
        } else {
            &self.course_name
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: '{other}'")),
        }
    }
}

/// A task, optionally linked to a course by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    /// Soft reference to [`ClassSession::course_code`]; not required to exist.
    pub course_code: String,
    pub title: String,
    #[serde(default)]
    pub description: String,

    /// ISO-8601 instant, or empty for "no deadline".
    #[serde(default)]
    pub deadline: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
}

impl Task {
    /// Returns the deadline as local wall-clock time.
    ///
    /// RFC 3339 values carrying an offset are converted to the local zone.
    /// Values without an offset (`2024-01-15T23:00` or `2024-01-15T23:00:00`)
    /// are taken as local time already. Empty or unparseable deadlines yield
    /// `None`.
    #[must_use]
    pub fn deadline_local(&self) -> Option<NaiveDateTime> {
        parse_deadline(&self.deadline)
    }
}

/// Changes to an existing task. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub course_code: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,

    /// New deadline; an empty string removes it.
    pub deadline: Option<String>,
    pub priority: Option<Priority>,
}

impl TaskEdit {
    /// True when the edit changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == TaskEdit::default()
    }

    /// Writes the changed fields into `task`. Id and completion are kept.
    pub fn apply_to(self, task: &mut Task) {
        if let Some(course_code) = self.course_code {
            task.course_code = course_code;
        }
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(deadline) = self.deadline {
            task.deadline = deadline;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
    }
}

/// Parses a deadline string into local wall-clock time.
#[must_use]
pub fn parse_deadline(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Local).naive_local());
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Parses an `HH:MM` 24-hour time into `(hour, minute)`.
#[must_use]
pub fn parse_hhmm(raw: &str) -> Option<(u32, u32)> {
    let (hours, minutes) = raw.trim().split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    (hours < 24 && minutes < 60).then_some((hours, minutes))
}

/// Per-category reminder switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub class_reminders: bool,
    pub task_day_before: bool,
    pub task_deadline: bool,
    pub task_hour_before: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            class_reminders: true,
            task_day_before: true,
            task_deadline: true,
            task_hour_before: true,
        }
    }
}

/// User preferences.
///
/// Missing fields (including nested notification settings) fall back to
/// their defaults on load, so older stored records keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub theme_id: String,

    /// Master switch: when off, no reminder rule is evaluated.
    pub enable_notifications: bool,
    pub notification_settings: NotificationSettings,
    pub show_quotes: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme_id: DEFAULT_THEME_ID.to_string(),
            enable_notifications: true,
            notification_settings: NotificationSettings::default(),
            show_quotes: true,
        }
    }
}

/// Everything the application owns: schedule, tasks, and preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub schedule: Vec<ClassSession>,
    pub tasks: Vec<Task>,
    pub preferences: Preferences,
}

/// Generates a short random base-36 record identifier.
#[must_use]
pub fn generate_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::rng();
    (0..RECORD_ID_LEN)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_session() -> ClassSession {
        ClassSession {
            id: "abc1234".to_string(),
            course_name: "Introduction to Programming".to_string(),
            course_code: "CSE101".to_string(),
            faculty: "JD".to_string(),
            room: "UB20401".to_string(),
            day: DayOfWeek::Monday,
            start_time: "09:00".to_string(),
            end_time: "10:30".to_string(),
            color: None,
        }
    }

    #[test]
    fn record_id_has_expected_shape() {
        let id = generate_id();
        assert_eq!(id.len(), RECORD_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn day_parses_full_and_short_names() {
        assert_eq!("Monday".parse::<DayOfWeek>().unwrap(), DayOfWeek::Monday);
        assert_eq!("thu".parse::<DayOfWeek>().unwrap(), DayOfWeek::Thursday);
        assert_eq!(" SUNDAY ".parse::<DayOfWeek>().unwrap(), DayOfWeek::Sunday);
        assert!("Funday".parse::<DayOfWeek>().is_err());
    }

    #[test]
    fn day_maps_from_chrono_weekday() {
        assert_eq!(DayOfWeek::from(Weekday::Sat), DayOfWeek::Saturday);
    }

    #[test]
    fn session_serializes_with_camel_case_fields() {
        let json = serde_json::to_value(sample_session()).unwrap();
        assert_eq!(json["courseName"], "Introduction to Programming");
        assert_eq!(json["courseCode"], "CSE101");
        assert_eq!(json["day"], "Monday");
        assert_eq!(json["startTime"], "09:00");
        assert!(json.get("color").is_none());
    }

    #[test]
    fn start_minutes_rejects_bad_times() {
        let mut session = sample_session();
        assert_eq!(session.start_minutes(), Some(540));

        session.start_time = "25:00".to_string();
        assert_eq!(session.start_minutes(), None);

        session.start_time = "nine".to_string();
        assert_eq!(session.start_minutes(), None);
    }

    #[test]
    fn naive_deadline_is_local_wall_time() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        assert_eq!(parse_deadline("2024-01-15T23:00:00"), Some(expected));
        assert_eq!(parse_deadline("2024-01-15T23:00"), Some(expected));
        assert_eq!(parse_deadline(""), None);
        assert_eq!(parse_deadline("tomorrow"), None);
    }

    #[test]
    fn rfc3339_deadline_is_converted_to_local() {
        let parsed = parse_deadline("2024-01-15T23:00:00Z").unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-01-15T23:00:00Z")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn preferences_merge_missing_fields_with_defaults() {
        let stored = r#"{"themeId":"violet","notificationSettings":{"taskHourBefore":false}}"#;
        let prefs: Preferences = serde_json::from_str(stored).unwrap();

        assert_eq!(prefs.theme_id, "violet");
        assert!(prefs.enable_notifications);
        assert!(prefs.show_quotes);
        assert!(prefs.notification_settings.class_reminders);
        assert!(!prefs.notification_settings.task_hour_before);
    }

    #[test]
    fn task_defaults_optional_fields() {
        let stored = r#"{"id":"t1","courseCode":"CSE101","title":"Lab report"}"#;
        let task: Task = serde_json::from_str(stored).unwrap();

        assert!(task.deadline.is_empty());
        assert!(!task.completed);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.deadline_local(), None);
    }

    #[test]
    fn task_edit_changes_only_given_fields() {
        let mut task = Task {
            id: "t1".to_string(),
            course_code: "CSE101".to_string(),
            title: "Lab report".to_string(),
            description: "Sections 1-3".to_string(),
            deadline: "2024-01-15T23:00".to_string(),
            completed: true,
            priority: Priority::Low,
        };

        assert!(TaskEdit::default().is_empty());
        TaskEdit {
            title: Some("Final lab report".to_string()),
            deadline: Some(String::new()),
            priority: Some(Priority::High),
            ..TaskEdit::default()
        }
        .apply_to(&mut task);

        assert_eq!(task.title, "Final lab report");
        assert!(task.deadline.is_empty());
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.course_code, "CSE101");
        assert_eq!(task.description, "Sections 1-3");
        assert!(task.completed);
    }
}
