//! Error types for UniFlow.
//!
//! Each module owns a focused error enum; [`UniflowError`] gathers them for
//! callers that drive several modules at once.

use thiserror::Error;

use crate::config::ConfigError;
use crate::delivery::NotifyError;
use crate::import::ImportError;
use crate::state::StateError;
use crate::storage::StorageError;
use crate::watcher::WatcherError;

/// Errors that can occur during UniFlow operations.
#[derive(Error, Debug)]
pub enum UniflowError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reading or writing stored records failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A state mutation was rejected.
    #[error("{0}")]
    State(#[from] StateError),

    /// Schedule import or task suggestion failed.
    #[error("import error: {0}")]
    Import(#[from] ImportError),

    /// A notification channel could not be set up.
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    /// The data directory watcher could not be started.
    #[error("watch error: {0}")]
    Watch(#[from] WatcherError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for UniFlow operations.
pub type Result<T> = std::result::Result<T, UniflowError>;
