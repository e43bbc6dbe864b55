//! Store watcher for picking up records written by other processes.
//!
//! The daemon keeps its state in memory, while one-shot CLI commands
//! (`uniflow task add`, `uniflow settings set`, ...) write straight to the
//! record files. This watcher notices those writes and reloads the affected
//! record into the running [`StateContainer`].
//!
//! # Architecture
//!
//! The notify callback only maps paths to [`Record`]s and forwards them with
//! `try_send` to an internal channel. A debounce task coalesces bursts (a save
//! is a write plus a rename) and emits each record once the directory has
//! been quiet for [`DEFAULT_DEBOUNCE`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::state::StateContainer;
use crate::storage::Record;

/// Quiet period before a changed record is reported.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Capacity of the channel between the notify callback and the debouncer.
const INTERNAL_CHANNEL_CAPACITY: usize = 256;

/// Errors that can occur while setting up the watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// The data directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Watches the data directory and reports changed records.
///
/// Dropping the watcher stops watching.
#[derive(Debug)]
pub struct StoreWatcher {
    /// Kept alive to maintain the watch subscription.
    _watcher: RecommendedWatcher,
    dir: PathBuf,
    debounce_task: JoinHandle<()>,
}

impl StoreWatcher {
    /// Starts watching `dir`, creating it if needed. Changed records are sent
    /// on `changes` after debouncing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file system
    /// watcher cannot be initialized.
    pub fn new(dir: PathBuf, changes: mpsc::Sender<Record>) -> Result<Self, WatcherError> {
        Self::with_debounce(dir, changes, DEFAULT_DEBOUNCE)
    }

    /// Like [`StoreWatcher::new`] with a custom quiet period.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file system
    /// watcher cannot be initialized.
    pub fn with_debounce(
        dir: PathBuf,
        changes: mpsc::Sender<Record>,
        debounce: Duration,
    ) -> Result<Self, WatcherError> {
        fs::create_dir_all(&dir)?;

        let (internal_tx, internal_rx) = mpsc::channel::<Record>(INTERNAL_CHANNEL_CAPACITY);
        let debounce_task = tokio::spawn(run_debounce_loop(debounce, internal_rx, changes));

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| handle_notify_event(res, &internal_tx),
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        info!(dir = %dir.display(), "Watching data directory");

        Ok(Self {
            _watcher: watcher,
            dir,
            debounce_task,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for StoreWatcher {
    fn drop(&mut self) {
        self.debounce_task.abort();
    }
}

/// Reloads every reported record into `state` until `changes` closes.
pub fn spawn_reloader(state: StateContainer, mut changes: mpsc::Receiver<Record>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = changes.recv().await {
            info!(key = record.key(), "Record changed on disk, reloading");
            state.reload(record).await;
        }
        debug!("Store reloader shutting down");
    })
}

fn handle_notify_event(res: Result<Event, notify::Error>, internal_tx: &mpsc::Sender<Record>) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Store watcher error");
            return;
        }
    };

    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }

    for record in event.paths.iter().filter_map(|path| Record::from_path(path)) {
        trace!(kind = ?event.kind, key = record.key(), "Record touched");
        // Never block the notify thread.
        if let Err(e) = internal_tx.try_send(record) {
            warn!(error = %e, "Failed to queue record change, channel may be full");
        }
    }
}

/// Emits each record once no event for it has arrived for `interval`.
async fn run_debounce_loop(
    interval: Duration,
    mut input_rx: mpsc::Receiver<Record>,
    output_tx: mpsc::Sender<Record>,
) {
    let mut pending: HashMap<Record, Instant> = HashMap::new();

    loop {
        let next_deadline = pending.values().min().copied();

        tokio::select! {
            event = input_rx.recv() => {
                match event {
                    Some(record) => {
                        pending.insert(record, Instant::now() + interval);
                    }
                    None => {
                        for (record, _) in pending.drain() {
                            let _ = output_tx.send(record).await;
                        }
                        break;
                    }
                }
            }

            () = async {
                match next_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                let now = Instant::now();
                let expired: Vec<Record> = pending
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(record, _)| *record)
                    .collect();

                for record in expired {
                    pending.remove(&record);
                    if output_tx.send(record).await.is_err() {
                        debug!("Record change receiver dropped");
                        return;
                    }
                }
            }
        }
    }

    debug!("Store debounce loop terminated");
}
