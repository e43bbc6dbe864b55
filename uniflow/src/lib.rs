//! UniFlow - class schedule and task reminder engine.
//!
//! This crate keeps a student's weekly class schedule and task list, and
//! announces upcoming classes and task deadlines at the right moment.
//!
//! # Overview
//!
//! A [`reminders::ReminderScheduler`] polls the [`reminders::rules`] once a
//! minute against a snapshot of the [`state::StateContainer`]. Each reminder
//! fires at most once per process thanks to the [`reminders::DedupLedger`],
//! and is handed to the [`delivery::DeliveryRouter`], which prefers a push
//! relay, then a desktop notification, and falls back to an in-app toast.
//!
//! Schedules can be imported from a PDF routine through Gemini
//! ([`import`]) and backed up to JSON ([`export`]).
//!
//! # Modules
//!
//! - [`types`]: Class sessions, tasks, and preferences
//! - [`clock`]: Injectable wall-clock sources
//! - [`reminders`]: Rule set, dedup ledger, scheduler, and agenda views
//! - [`delivery`]: Notification channels and the fallback router
//! - [`state`]: Shared application state container
//! - [`storage`]: JSON record storage
//! - [`watcher`]: Reloads records written by other processes
//! - [`import`]: PDF schedule extraction and task suggestions
//! - [`export`]: JSON backups
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Crate-level error type

pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod export;
pub mod import;
pub mod reminders;
pub mod state;
pub mod storage;
pub mod types;
pub mod watcher;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use delivery::{DeliveryReport, DeliveryRouter, PermissionState};
pub use error::{Result, UniflowError};
pub use reminders::{DedupLedger, Reminder, ReminderKind, ReminderScheduler};
pub use state::{StateContainer, StateError};
pub use storage::{Record, Storage, StorageError};
pub use types::{AppState, ClassSession, DayOfWeek, Preferences, Priority, Task, TaskEdit};
pub use watcher::{StoreWatcher, WatcherError};
