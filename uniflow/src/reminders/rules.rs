//! Reminder rules.
//!
//! Pure functions mapping `(now, schedule, tasks, settings)` to the reminders
//! that are due at this instant. Nothing here touches the ledger or any
//! delivery channel.
//!
//! # Firing windows
//!
//! | Kind | Due when | Dedup key |
//! |------|----------|-----------|
//! | class start | session starts in exactly 30 whole minutes today | `class-{id}-{date}` |
//! | task day-before | within 60 s after midnight starting the day before the deadline | `task-{id}-24h` |
//! | task due today | within 60 s after midnight starting the deadline day | `task-{id}-today` |
//! | task hour-before | within 60 s after `deadline - 1h` | `task-{id}-1h` |
//!
//! Windows are one poll period wide. A poll that arrives late (for instance
//! after the machine slept) misses the window for good.

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};
use tracing::debug;

use crate::types::{AppState, ClassSession, DayOfWeek, NotificationSettings, Task};

/// Minutes before a class starts at which its reminder fires.
pub const CLASS_LEAD_MINUTES: i64 = 30;

/// Width of every task firing window, in milliseconds.
pub const FIRING_WINDOW_MS: i64 = 60_000;

/// Date rendering used in class dedup keys, e.g. `Mon Jan 15 2024`.
const KEY_DATE_FORMAT: &str = "%a %b %d %Y";

/// The category a reminder belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderKind {
    ClassStart,
    TaskDayBefore,
    TaskDueToday,
    TaskHourBefore,
}

/// The three task firing windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskWindow {
    DayBefore,
    DueToday,
    HourBefore,
}

impl TaskWindow {
    /// Suffix used in the dedup key.
    #[must_use]
    pub fn key_suffix(&self) -> &'static str {
        match self {
            TaskWindow::DayBefore => "24h",
            TaskWindow::DueToday => "today",
            TaskWindow::HourBefore => "1h",
        }
    }

    #[must_use]
    pub fn kind(&self) -> ReminderKind {
        match self {
            TaskWindow::DayBefore => ReminderKind::TaskDayBefore,
            TaskWindow::DueToday => ReminderKind::TaskDueToday,
            TaskWindow::HourBefore => ReminderKind::TaskHourBefore,
        }
    }
}

/// A reminder that qualifies at the evaluated instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    /// Identifies this occurrence for deduplication.
    pub key: String,
    pub kind: ReminderKind,
    pub title: String,
    pub body: String,
}

/// Evaluates every rule against a full state snapshot.
///
/// Returns nothing when the master switch is off; the per-category settings
/// are not consulted in that case.
#[must_use]
pub fn evaluate_state(now: NaiveDateTime, state: &AppState) -> Vec<Reminder> {
    if !state.preferences.enable_notifications {
        return Vec::new();
    }

    evaluate(
        now,
        &state.schedule,
        &state.tasks,
        &state.preferences.notification_settings,
    )
}

/// Evaluates class and task rules. The caller has already checked the master
/// switch.
#[must_use]
pub fn evaluate(
    now: NaiveDateTime,
    schedule: &[ClassSession],
    tasks: &[Task],
    settings: &NotificationSettings,
) -> Vec<Reminder> {
    let mut due = Vec::new();

    if settings.class_reminders {
        due.extend(schedule.iter().filter_map(|session| class_reminder(now, session)));
    }

    for task in tasks {
        due.extend(task_reminders(now, task, settings));
    }

    due
}

/// Returns the class reminder for `session` if it starts in exactly
/// [`CLASS_LEAD_MINUTES`] minutes today.
#[must_use]
pub fn class_reminder(now: NaiveDateTime, session: &ClassSession) -> Option<Reminder> {
    if session.day != DayOfWeek::from(now.weekday()) {
        return None;
    }

    let Some(session_minutes) = session.start_minutes() else {
        debug!(
            session_id = %session.id,
            start_time = %session.start_time,
            "Skipping session with unparseable start time"
        );
        return None;
    };

    let now_minutes = i64::from(now.hour() * 60 + now.minute());
    if i64::from(session_minutes) - now_minutes != CLASS_LEAD_MINUTES {
        return None;
    }

    Some(Reminder {
        key: class_key(&session.id, now),
        kind: ReminderKind::ClassStart,
        title: format!("Upcoming class: {}", session.display_name()),
        body: format!(
            "{} starts at {} in room {}.",
            session.course_code, session.start_time, session.room
        ),
    })
}

/// Returns every task reminder whose window is open at `now`.
#[must_use]
pub fn task_reminders(
    now: NaiveDateTime,
    task: &Task,
    settings: &NotificationSettings,
) -> Vec<Reminder> {
    if task.completed || task.deadline.trim().is_empty() {
        return Vec::new();
    }

    let Some(deadline) = task.deadline_local() else {
        debug!(
            task_id = %task.id,
            deadline = %task.deadline,
            "Skipping task with unparseable deadline"
        );
        return Vec::new();
    };

    let deadline_midnight = deadline.date().and_time(NaiveTime::MIN);
    let candidates = [
        (
            settings.task_day_before,
            TaskWindow::DayBefore,
            deadline_midnight - Duration::days(1),
        ),
        (
            settings.task_deadline,
            TaskWindow::DueToday,
            deadline_midnight,
        ),
        (
            settings.task_hour_before,
            TaskWindow::HourBefore,
            deadline - Duration::hours(1),
        ),
    ];

    candidates
        .into_iter()
        .filter(|(enabled, _, target)| *enabled && in_window(now, *target))
        .map(|(_, window, _)| task_reminder(task, deadline, window))
        .collect()
}

/// True when `now` falls in `[target, target + 60s)`.
#[must_use]
pub fn in_window(now: NaiveDateTime, target: NaiveDateTime) -> bool {
    let elapsed = (now - target).num_milliseconds();
    (0..FIRING_WINDOW_MS).contains(&elapsed)
}

/// Dedup key for a class reminder on the calendar day of `now`.
#[must_use]
pub fn class_key(session_id: &str, now: NaiveDateTime) -> String {
    format!("class-{session_id}-{}", now.format(KEY_DATE_FORMAT))
}

/// Dedup key for a task reminder. Task keys carry no date: each window
/// fires at most once per task for the life of the process.
#[must_use]
pub fn task_key(task_id: &str, window: TaskWindow) -> String {
    format!("task-{task_id}-{}", window.key_suffix())
}

fn task_reminder(task: &Task, deadline: NaiveDateTime, window: TaskWindow) -> Reminder {
    let (title, body) = match window {
        TaskWindow::DayBefore => (
            "Task due tomorrow".to_string(),
            format!("{} ({}) is due tomorrow.", task.title, task.course_code),
        ),
        TaskWindow::DueToday => (
            "Task due today".to_string(),
            format!(
                "{} ({}) is due today at {}.",
                task.title,
                task.course_code,
                deadline.format("%H:%M")
            ),
        ),
        TaskWindow::HourBefore => (
            "Task due in 1 hour".to_string(),
            format!(
                "{} ({}) is due at {}.",
                task.title,
                task.course_code,
                deadline.format("%H:%M")
            ),
        ),
    };

    Reminder {
        key: task_key(&task.id, window),
        kind: window.kind(),
        title,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Preferences, Priority};
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn monday_class(start: &str) -> ClassSession {
        ClassSession {
            id: "cls1".to_string(),
            course_name: "Data Structures".to_string(),
            course_code: "CSE220".to_string(),
            faculty: "AR".to_string(),
            room: "UB30201".to_string(),
            day: DayOfWeek::Monday,
            start_time: start.to_string(),
            end_time: "10:30".to_string(),
            color: None,
        }
    }

    fn task_due(deadline: &str) -> Task {
        Task {
            id: "tsk1".to_string(),
            course_code: "CSE220".to_string(),
            title: "Assignment 2".to_string(),
            description: String::new(),
            deadline: deadline.to_string(),
            completed: false,
            priority: Priority::High,
        }
    }

    #[test]
    fn class_fires_exactly_thirty_minutes_before() {
        // 2024-01-15 is a Monday.
        let reminder = class_reminder(at(2024, 1, 15, 8, 30, 0), &monday_class("09:00"))
            .expect("should fire at 08:30");

        assert_eq!(reminder.kind, ReminderKind::ClassStart);
        assert_eq!(reminder.key, "class-cls1-Mon Jan 15 2024");
        assert!(reminder.body.contains("UB30201"));
    }

    #[test]
    fn class_ignores_seconds_within_the_minute() {
        assert!(class_reminder(at(2024, 1, 15, 8, 30, 59), &monday_class("09:00")).is_some());
    }

    #[test]
    fn class_does_not_fire_off_the_mark() {
        let session = monday_class("09:00");
        assert!(class_reminder(at(2024, 1, 15, 8, 29, 0), &session).is_none());
        assert!(class_reminder(at(2024, 1, 15, 8, 31, 0), &session).is_none());
    }

    #[test]
    fn class_does_not_fire_on_other_days() {
        // 2024-01-16 is a Tuesday.
        assert!(class_reminder(at(2024, 1, 16, 8, 30, 0), &monday_class("09:00")).is_none());
    }

    #[test]
    fn class_before_half_past_midnight_never_fires() {
        // No previous-day lookback: 00:15 would need a 23:45 poll yesterday.
        let session = monday_class("00:15");
        for minute in 0..60 {
            assert!(class_reminder(at(2024, 1, 14, 23, minute, 0), &session).is_none());
        }
    }

    #[test]
    fn class_with_bad_start_time_is_skipped() {
        assert!(class_reminder(at(2024, 1, 15, 8, 30, 0), &monday_class("9am")).is_none());
    }

    #[test]
    fn hour_before_window_is_sixty_seconds() {
        let task = task_due("2024-01-15T23:00:00");
        let settings = NotificationSettings::default();

        let fired = task_reminders(at(2024, 1, 15, 22, 0, 30), &task, &settings);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].key, "task-tsk1-1h");

        assert_eq!(task_reminders(at(2024, 1, 15, 22, 0, 0), &task, &settings).len(), 1);
        assert!(task_reminders(at(2024, 1, 15, 22, 1, 0), &task, &settings).is_empty());
        assert!(task_reminders(at(2024, 1, 15, 21, 59, 59), &task, &settings).is_empty());
    }

    #[test]
    fn day_before_and_due_today_align_to_midnight() {
        let task = task_due("2024-01-15T23:00:00");
        let settings = NotificationSettings::default();

        let day_before = task_reminders(at(2024, 1, 14, 0, 0, 10), &task, &settings);
        assert_eq!(day_before.len(), 1);
        assert_eq!(day_before[0].key, "task-tsk1-24h");

        let today = task_reminders(at(2024, 1, 15, 0, 0, 10), &task, &settings);
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].key, "task-tsk1-today");
        assert_eq!(today[0].kind, ReminderKind::TaskDueToday);
    }

    #[test]
    fn early_deadline_can_open_two_windows_at_once() {
        // Due 01:00: hour-before target is midnight, same as due-today.
        let task = task_due("2024-01-15T01:00:00");
        let fired = task_reminders(
            at(2024, 1, 15, 0, 0, 5),
            &task,
            &NotificationSettings::default(),
        );

        let keys: Vec<_> = fired.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["task-tsk1-today", "task-tsk1-1h"]);
    }

    #[test]
    fn completed_task_never_fires() {
        let mut task = task_due("2024-01-15T23:00:00");
        task.completed = true;

        assert!(task_reminders(
            at(2024, 1, 15, 22, 0, 30),
            &task,
            &NotificationSettings::default()
        )
        .is_empty());
    }

    #[test]
    fn task_without_deadline_never_fires() {
        let task = task_due("");
        assert!(task_reminders(
            at(2024, 1, 15, 0, 0, 0),
            &task,
            &NotificationSettings::default()
        )
        .is_empty());
    }

    #[test]
    fn category_switches_gate_each_rule() {
        let task = task_due("2024-01-15T23:00:00");
        let settings = NotificationSettings {
            task_hour_before: false,
            ..NotificationSettings::default()
        };

        assert!(task_reminders(at(2024, 1, 15, 22, 0, 30), &task, &settings).is_empty());

        let no_classes = NotificationSettings {
            class_reminders: false,
            ..NotificationSettings::default()
        };
        let due = evaluate(
            at(2024, 1, 15, 8, 30, 0),
            &[monday_class("09:00")],
            &[],
            &no_classes,
        );
        assert!(due.is_empty());
    }

    #[test]
    fn master_switch_off_evaluates_nothing() {
        let state = AppState {
            schedule: vec![monday_class("09:00")],
            tasks: vec![task_due("2024-01-15T09:30:00")],
            preferences: Preferences {
                enable_notifications: false,
                ..Preferences::default()
            },
        };

        assert!(evaluate_state(at(2024, 1, 15, 8, 30, 0), &state).is_empty());
    }

    #[test]
    fn evaluate_state_combines_classes_and_tasks() {
        let state = AppState {
            schedule: vec![monday_class("09:00")],
            tasks: vec![task_due("2024-01-15T09:30:00")],
            preferences: Preferences::default(),
        };

        let due = evaluate_state(at(2024, 1, 15, 8, 30, 0), &state);
        let kinds: Vec<_> = due.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![ReminderKind::ClassStart, ReminderKind::TaskHourBefore]
        );
    }

    #[test]
    fn task_windows_map_to_keys_and_kinds() {
        assert_eq!(task_key("t9", TaskWindow::DayBefore), "task-t9-24h");
        assert_eq!(task_key("t9", TaskWindow::DueToday), "task-t9-today");
        assert_eq!(task_key("t9", TaskWindow::HourBefore), "task-t9-1h");
        assert_eq!(TaskWindow::HourBefore.kind(), ReminderKind::TaskHourBefore);
    }
}
