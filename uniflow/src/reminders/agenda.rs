//! What to show the user right now: today's current and next class, and the
//! order tasks are listed in.

use std::cmp::Ordering;

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::types::{ClassSession, DayOfWeek, Task};

/// Today's class in progress and the next one still to start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NextClass<'a> {
    /// Started at or before `now` and not yet ended.
    pub ongoing: Option<&'a ClassSession>,
    /// Earliest class starting after `now`.
    pub upcoming: Option<&'a ClassSession>,
}

/// Finds today's ongoing and upcoming class.
///
/// Only sessions on the weekday of `now` are considered; sessions with an
/// unparseable start time are ignored.
#[must_use]
pub fn next_class(now: NaiveDateTime, schedule: &[ClassSession]) -> NextClass<'_> {
    let today = DayOfWeek::from(now.weekday());
    let now_minutes = now.hour() * 60 + now.minute();

    let mut todays: Vec<(u32, &ClassSession)> = schedule
        .iter()
        .filter(|session| session.day == today)
        .filter_map(|session| session.start_minutes().map(|start| (start, session)))
        .collect();
    todays.sort_by_key(|(start, _)| *start);

    let upcoming = todays
        .iter()
        .find(|(start, _)| *start > now_minutes)
        .map(|(_, session)| *session);
    let ongoing = todays
        .iter()
        .find(|(start, session)| {
            *start <= now_minutes && session.end_minutes().is_some_and(|end| now_minutes < end)
        })
        .map(|(_, session)| *session);

    NextClass { ongoing, upcoming }
}

/// Sorts tasks for listing: open tasks first, then by earliest deadline, with
/// tasks that have no usable deadline last. Ties keep their stored order.
pub fn sort_for_listing(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.completed.cmp(&b.completed).then_with(|| {
            match (a.deadline_local(), b.deadline_local()) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
    });
}
