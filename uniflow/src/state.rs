//! Application state container.
//!
//! Holds the schedule, tasks, and preferences behind a single async
//! read-write lock so readers always see a consistent snapshot. Preference
//! changes are additionally published on a `watch` channel, which is how the
//! scheduler learns that it must restart.
//!
//! When a [`Storage`] is attached every mutation is persisted before it is
//! committed in memory: a failed write leaves the in-memory state unchanged.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::storage::{Record, Storage, StorageError};
use crate::types::{AppState, ClassSession, Preferences, Task};

/// Errors from state mutations.
#[derive(Error, Debug)]
pub enum StateError {
    /// No class session with the given id.
    #[error("no class with id {0}")]
    ClassNotFound(String),

    /// No task with the given id.
    #[error("no task with id {0}")]
    TaskNotFound(String),

    /// The mutation could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Shared, cloneable handle to the application state.
#[derive(Clone)]
pub struct StateContainer {
    state: Arc<RwLock<AppState>>,
    preferences: Arc<watch::Sender<Preferences>>,
    storage: Option<Storage>,
}

impl StateContainer {
    /// Creates an in-memory container.
    #[must_use]
    pub fn new(initial: AppState) -> Self {
        let (preferences, _) = watch::channel(initial.preferences.clone());
        Self {
            state: Arc::new(RwLock::new(initial)),
            preferences: Arc::new(preferences),
            storage: None,
        }
    }

    /// Creates a container loaded from, and persisting to, `storage`.
    #[must_use]
    pub fn with_storage(storage: Storage) -> Self {
        let initial = storage.load_state();
        info!(
            classes = initial.schedule.len(),
            tasks = initial.tasks.len(),
            dir = %storage.dir().display(),
            "Loaded stored state"
        );
        let mut container = Self::new(initial);
        container.storage = Some(storage);
        container
    }

    #[must_use]
    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    /// A consistent copy of the whole state.
    pub async fn snapshot(&self) -> AppState {
        self.state.read().await.clone()
    }

    /// The current preferences.
    #[must_use]
    pub fn preferences(&self) -> Preferences {
        self.preferences.borrow().clone()
    }

    /// Receives the preferences every time they change.
    #[must_use]
    pub fn subscribe_preferences(&self) -> watch::Receiver<Preferences> {
        self.preferences.subscribe()
    }

    /// Replaces the whole schedule, as after a confirmed import.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the schedule cannot be persisted.
    pub async fn replace_schedule(&self, schedule: Vec<ClassSession>) -> Result<(), StateError> {
        let mut state = self.state.write().await;
        self.persist_schedule(&schedule)?;
        info!(classes = schedule.len(), "Schedule replaced");
        state.schedule = schedule;
        Ok(())
    }

    /// Appends a class session.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the schedule cannot be persisted.
    pub async fn add_class(&self, session: ClassSession) -> Result<(), StateError> {
        let mut state = self.state.write().await;
        let mut schedule = state.schedule.clone();
        debug!(class_id = %session.id, "Adding class");
        schedule.push(session);
        self.persist_schedule(&schedule)?;
        state.schedule = schedule;
        Ok(())
    }

    /// Removes a class session and returns it.
    ///
    /// # Errors
    ///
    /// Returns `StateError::ClassNotFound` for an unknown id, or
    /// `StateError::Storage` if the schedule cannot be persisted.
    pub async fn delete_class(&self, id: &str) -> Result<ClassSession, StateError> {
        let mut state = self.state.write().await;
        let index = state
            .schedule
            .iter()
            .position(|session| session.id == id)
            .ok_or_else(|| StateError::ClassNotFound(id.to_string()))?;

        let mut schedule = state.schedule.clone();
        let removed = schedule.remove(index);
        self.persist_schedule(&schedule)?;
        state.schedule = schedule;
        Ok(removed)
    }

    /// Appends a task.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the tasks cannot be persisted.
    pub async fn add_task(&self, task: Task) -> Result<(), StateError> {
        let mut state = self.state.write().await;
        let mut tasks = state.tasks.clone();
        debug!(task_id = %task.id, "Adding task");
        tasks.push(task);
        self.persist_tasks(&tasks)?;
        state.tasks = tasks;
        Ok(())
    }

    /// Returns a copy of the task with `id`.
    ///
    /// # Errors
    ///
    /// Returns `StateError::TaskNotFound` for an unknown id.
    pub async fn find_task(&self, id: &str) -> Result<Task, StateError> {
        self.state
            .read()
            .await
            .tasks
            .iter()
            .find(|task| task.id == id)
            .cloned()
            .ok_or_else(|| StateError::TaskNotFound(id.to_string()))
    }

    /// Replaces the task with the same id.
    ///
    /// # Errors
    ///
    /// Returns `StateError::TaskNotFound` for an unknown id, or
    /// `StateError::Storage` if the tasks cannot be persisted.
    pub async fn update_task(&self, task: Task) -> Result<(), StateError> {
        let id = task.id.clone();
        self.modify_task(&id, move |existing| *existing = task)
            .await
            .map(|_| ())
    }

    /// Sets a task's completion flag and returns the updated task.
    ///
    /// # Errors
    ///
    /// Returns `StateError::TaskNotFound` for an unknown id, or
    /// `StateError::Storage` if the tasks cannot be persisted.
    pub async fn set_task_completed(&self, id: &str, completed: bool) -> Result<Task, StateError> {
        self.modify_task(id, |task| task.completed = completed).await
    }

    /// Flips a task's completion flag and returns the updated task.
    ///
    /// # Errors
    ///
    /// Returns `StateError::TaskNotFound` for an unknown id, or
    /// `StateError::Storage` if the tasks cannot be persisted.
    pub async fn toggle_task(&self, id: &str) -> Result<Task, StateError> {
        self.modify_task(id, |task| task.completed = !task.completed)
            .await
    }

    /// Removes a task and returns it.
    ///
    /// # Errors
    ///
    /// Returns `StateError::TaskNotFound` for an unknown id, or
    /// `StateError::Storage` if the tasks cannot be persisted.
    pub async fn delete_task(&self, id: &str) -> Result<Task, StateError> {
        let mut state = self.state.write().await;
        let index = state
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| StateError::TaskNotFound(id.to_string()))?;

        let mut tasks = state.tasks.clone();
        let removed = tasks.remove(index);
        self.persist_tasks(&tasks)?;
        state.tasks = tasks;
        Ok(removed)
    }

    /// Applies `change` to the preferences, persists, and publishes them.
    /// Returns the new preferences.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the preferences cannot be persisted.
    pub async fn update_preferences<F>(&self, change: F) -> Result<Preferences, StateError>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut state = self.state.write().await;
        let mut prefs = state.preferences.clone();
        change(&mut prefs);

        if let Some(storage) = &self.storage {
            storage.save_preferences(&prefs)?;
        }
        state.preferences = prefs.clone();
        self.publish_preferences(prefs.clone());
        Ok(prefs)
    }

    /// Clears stored data and returns to defaults.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if stored records cannot be removed.
    pub async fn reset(&self) -> Result<(), StateError> {
        let mut state = self.state.write().await;
        if let Some(storage) = &self.storage {
            storage.clear()?;
        }
        *state = AppState::default();
        self.publish_preferences(state.preferences.clone());
        info!("State reset to defaults");
        Ok(())
    }

    /// Reloads one record from storage, e.g. after another process wrote it.
    /// Does nothing for an in-memory container.
    pub async fn reload(&self, record: Record) {
        let Some(storage) = &self.storage else {
            return;
        };

        let mut state = self.state.write().await;
        match record {
            Record::Schedule => state.schedule = storage.load_schedule(),
            Record::Tasks => state.tasks = storage.load_tasks(),
            Record::Preferences => {
                state.preferences = storage.load_preferences();
                self.publish_preferences(state.preferences.clone());
            }
        }
        debug!(key = record.key(), "Reloaded record");
    }

    async fn modify_task<F>(&self, id: &str, change: F) -> Result<Task, StateError>
    where
        F: FnOnce(&mut Task),
    {
        let mut state = self.state.write().await;
        let mut tasks = state.tasks.clone();
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| StateError::TaskNotFound(id.to_string()))?;
        change(task);
        let updated = task.clone();

        self.persist_tasks(&tasks)?;
        state.tasks = tasks;
        Ok(updated)
    }

    fn persist_schedule(&self, schedule: &[ClassSession]) -> Result<(), StorageError> {
        match &self.storage {
            Some(storage) => storage.save_schedule(schedule),
            None => Ok(()),
        }
    }

    fn persist_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        match &self.storage {
            Some(storage) => storage.save_tasks(tasks),
            None => Ok(()),
        }
    }

    /// Publishes only real changes so subscribers do not restart needlessly.
    fn publish_preferences(&self, prefs: Preferences) {
        self.preferences.send_if_modified(|current| {
            if *current == prefs {
                false
            } else {
                *current = prefs;
                true
            }
        });
    }
}

impl Default for StateContainer {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DayOfWeek, Priority, TaskEdit};
    use tempfile::TempDir;

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            course_code: "CSE220".to_string(),
            title: "Lab report".to_string(),
            description: String::new(),
            deadline: "2024-01-16T23:00".to_string(),
            completed: false,
            priority: Priority::High,
        }
    }

    fn session(id: &str) -> ClassSession {
        ClassSession {
            id: id.to_string(),
            course_name: "Data Structures".to_string(),
            course_code: "CSE220".to_string(),
            faculty: "MMR".to_string(),
            room: "09A-06C".to_string(),
            day: DayOfWeek::Monday,
            start_time: "09:00".to_string(),
            end_time: "10:20".to_string(),
            color: None,
        }
    }

    #[tokio::test]
    async fn task_crud_updates_snapshot() {
        let state = StateContainer::default();
        state.add_task(task("t1")).await.unwrap();
        state.add_task(task("t2")).await.unwrap();

        let toggled = state.toggle_task("t1").await.unwrap();
        assert!(toggled.completed);

        let removed = state.delete_task("t2").await.unwrap();
        assert_eq!(removed.id, "t2");

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.tasks.len(), 1);
        assert!(snapshot.tasks[0].completed);
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let state = StateContainer::default();
        assert!(matches!(
            state.delete_class("nope").await,
            Err(StateError::ClassNotFound(_))
        ));
        assert!(matches!(
            state.set_task_completed("nope", true).await,
            Err(StateError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn preference_changes_are_published_once() {
        let state = StateContainer::default();
        let mut rx = state.subscribe_preferences();

        state
            .update_preferences(|prefs| prefs.enable_notifications = false)
            .await
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().enable_notifications);

        state
            .update_preferences(|prefs| prefs.enable_notifications = false)
            .await
            .unwrap();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn mutations_are_persisted() {
        let dir = TempDir::new().unwrap();
        let state = StateContainer::with_storage(Storage::new(dir.path()));
        state.add_class(session("c1")).await.unwrap();
        state.add_task(task("t1")).await.unwrap();
        state
            .update_preferences(|prefs| prefs.show_quotes = false)
            .await
            .unwrap();

        let reloaded = StateContainer::with_storage(Storage::new(dir.path()));
        let snapshot = reloaded.snapshot().await;
        assert_eq!(snapshot.schedule[0].id, "c1");
        assert_eq!(snapshot.tasks[0].id, "t1");
        assert!(!snapshot.preferences.show_quotes);
    }

    #[tokio::test]
    async fn reset_clears_storage_and_memory() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let state = StateContainer::with_storage(storage.clone());
        state.replace_schedule(vec![session("c1")]).await.unwrap();

        state.reset().await.unwrap();

        assert_eq!(state.snapshot().await, AppState::default());
        assert!(!storage.path_for(Record::Schedule).exists());
    }

    #[tokio::test]
    async fn reload_picks_up_external_writes() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let state = StateContainer::with_storage(storage.clone());
        let mut rx = state.subscribe_preferences();

        let mut prefs = Preferences::default();
        prefs.notification_settings.class_reminders = false;
        storage.save_preferences(&prefs).unwrap();
        storage.save_tasks(&[task("t9")]).unwrap();

        state.reload(Record::Preferences).await;
        state.reload(Record::Tasks).await;

        assert!(rx.has_changed().unwrap());
        assert!(!state.preferences().notification_settings.class_reminders);
        assert_eq!(state.snapshot().await.tasks[0].id, "t9");
    }

    #[tokio::test]
    async fn edited_task_replaces_stored_copy() {
        let dir = TempDir::new().unwrap();
        let state = StateContainer::with_storage(Storage::new(dir.path()));
        state.add_task(task("t1")).await.unwrap();
        state.add_task(task("t2")).await.unwrap();

        let mut edited = state.find_task("t1").await.unwrap();
        TaskEdit {
            title: Some("Lab report v2".to_string()),
            course_code: Some("CSE221".to_string()),
            ..TaskEdit::default()
        }
        .apply_to(&mut edited);
        state.update_task(edited).await.unwrap();

        let reloaded = StateContainer::with_storage(Storage::new(dir.path()));
        let snapshot = reloaded.snapshot().await;
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.tasks[0].title, "Lab report v2");
        assert_eq!(snapshot.tasks[0].course_code, "CSE221");
        assert_eq!(snapshot.tasks[1].title, "Lab report");

        assert!(matches!(
            state.update_task(task("missing")).await,
            Err(StateError::TaskNotFound(_))
        ));
    }
}
