//! Reminder engine: rules, dedup ledger, and the polling scheduler, plus the
//! agenda views built on the same schedule and task data.

pub mod agenda;
pub mod ledger;
pub mod rules;
pub mod scheduler;

pub use agenda::{next_class, sort_for_listing, NextClass};
pub use ledger::DedupLedger;
pub use rules::{evaluate, evaluate_state, Reminder, ReminderKind, TaskWindow};
pub use scheduler::{ReminderScheduler, DEFAULT_POLL_INTERVAL};
