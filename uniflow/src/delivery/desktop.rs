//! Desktop notifications through the platform notification service.
//!
//! The operating system does not ask per-application permission for desktop
//! notifications, so UniFlow keeps its own tri-state permission in
//! `permission.json` inside the data directory. The state only moves when the
//! user answers the prompt shown by `uniflow notifications request`.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
#[cfg(all(unix, not(target_os = "macos")))]
use notify_rust::Hint;
use notify_rust::{Notification, Timeout};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::capability::{NotificationCapability, NotificationOptions, NotifyError, PermissionState};

/// File name of the stored permission inside the data directory.
pub const PERMISSION_FILE: &str = "permission.json";

/// Application name shown by the notification daemon.
const APP_NAME: &str = "UniFlow";

/// Custom XDG hint carrying the reminder tag.
#[cfg(all(unix, not(target_os = "macos")))]
const TAG_HINT: &str = "x-uniflow-tag";

/// Custom XDG hint carrying the vibration pattern.
#[cfg(all(unix, not(target_os = "macos")))]
const VIBRATE_HINT: &str = "x-uniflow-vibrate";

/// Asks the user whether notifications are allowed. Runs on a blocking thread.
pub type PermissionPrompt = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Debug, Serialize, Deserialize)]
struct StoredPermission {
    state: PermissionState,
}

/// System notification capability backed by `notify-rust`.
pub struct DesktopNotifier {
    permission_path: PathBuf,
    state: Mutex<PermissionState>,
    prompt: PermissionPrompt,
}

impl DesktopNotifier {
    /// Loads the stored permission from `data_dir`.
    ///
    /// A missing or unreadable permission file counts as
    /// [`PermissionState::Default`].
    #[must_use]
    pub fn load(data_dir: &Path, prompt: PermissionPrompt) -> Self {
        let permission_path = data_dir.join(PERMISSION_FILE);
        let state = read_permission(&permission_path).unwrap_or_default();

        debug!(
            path = %permission_path.display(),
            permission = ?state,
            "Loaded notification permission"
        );

        Self {
            permission_path,
            state: Mutex::new(state),
            prompt,
        }
    }

    /// A prompt that asks on stderr and reads the answer from stdin.
    #[must_use]
    pub fn terminal_prompt() -> PermissionPrompt {
        Arc::new(|| {
            eprint!("Allow UniFlow to show desktop notifications? [y/N] ");
            if io::stderr().flush().is_err() {
                return false;
            }

            let mut input = String::new();
            match io::stdin().lock().read_line(&mut input) {
                Ok(_) => input.trim().eq_ignore_ascii_case("y"),
                Err(_) => false,
            }
        })
    }

    fn set_permission(&self, next: PermissionState) -> Result<(), NotifyError> {
        *self.lock_state() = next;

        if let Some(parent) = self.permission_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&StoredPermission { state: next })
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.permission_path, json)?;
        Ok(())
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PermissionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NotificationCapability for DesktopNotifier {
    /// Re-reads the stored permission so that a grant made by another
    /// process is picked up without restarting.
    fn permission(&self) -> PermissionState {
        let mut state = self.lock_state();
        if let Some(stored) = read_permission(&self.permission_path) {
            *state = stored;
        }
        *state
    }

    fn request_permission(&self) -> BoxFuture<'_, PermissionState> {
        Box::pin(async move {
            let current = self.permission();
            if !current.can_prompt() {
                debug!(permission = ?current, "Permission already settled, not prompting");
                return current;
            }

            let prompt = Arc::clone(&self.prompt);
            let allowed = tokio::task::spawn_blocking(move || prompt())
                .await
                .unwrap_or(false);
            let next = current.after_prompt(allowed);

            if let Err(e) = self.set_permission(next) {
                warn!(error = %e, "Failed to store notification permission");
            }
            info!(permission = ?next, "Notification permission updated");

            next
        })
    }

    fn show<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        options: &'a NotificationOptions,
    ) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            let permission = self.permission();
            if permission != PermissionState::Granted {
                return Err(NotifyError::NotPermitted(permission));
            }

            let notification = build_notification(title, body, options);

            tokio::task::spawn_blocking(move || {
                notification
                    .show()
                    .map(|_| ())
                    .map_err(|e| NotifyError::Display(e.to_string()))
            })
            .await
            .map_err(|e| NotifyError::Display(e.to_string()))?
        })
    }
}

/// Builds the platform notification. On XDG desktops the tag and vibration
/// pattern travel as custom hints, and a notification that needs interaction
/// is marked resident.
fn build_notification(title: &str, body: &str, options: &NotificationOptions) -> Notification {
    let mut notification = Notification::new();
    notification.summary(title).body(body).appname(APP_NAME);
    if options.require_interaction {
        notification.timeout(Timeout::Never);
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        notification.hint(Hint::Custom(TAG_HINT.to_string(), options.tag.clone()));
        if !options.vibrate.is_empty() {
            let pattern = options
                .vibrate
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            notification.hint(Hint::Custom(VIBRATE_HINT.to_string(), pattern));
        }
        if options.require_interaction {
            notification.hint(Hint::Resident(true));
        }
    }

    notification
}

fn read_permission(path: &Path) -> Option<PermissionState> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read notification permission");
            return None;
        }
    };

    match serde_json::from_str::<StoredPermission>(&contents) {
        Ok(stored) => Some(stored.state),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed notification permission");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn counting_prompt(answer: bool) -> (PermissionPrompt, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let prompt: PermissionPrompt = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            answer
        });
        (prompt, calls)
    }

    #[test]
    fn missing_file_means_default() {
        let dir = TempDir::new().unwrap();
        let (prompt, _) = counting_prompt(true);

        let notifier = DesktopNotifier::load(dir.path(), prompt);
        assert_eq!(notifier.permission(), PermissionState::Default);
    }

    #[test]
    fn malformed_file_means_default() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PERMISSION_FILE), "not json").unwrap();
        let (prompt, _) = counting_prompt(true);

        let notifier = DesktopNotifier::load(dir.path(), prompt);
        assert_eq!(notifier.permission(), PermissionState::Default);
    }

    #[tokio::test]
    async fn granted_request_is_persisted() {
        let dir = TempDir::new().unwrap();
        let (prompt, calls) = counting_prompt(true);

        let notifier = DesktopNotifier::load(dir.path(), prompt);
        assert_eq!(notifier.request_permission().await, PermissionState::Granted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (prompt, _) = counting_prompt(false);
        let reloaded = DesktopNotifier::load(dir.path(), prompt);
        assert_eq!(reloaded.permission(), PermissionState::Granted);
    }

    #[tokio::test]
    async fn grant_from_another_process_is_picked_up() {
        let dir = TempDir::new().unwrap();
        let (prompt, _) = counting_prompt(false);
        let daemon = DesktopNotifier::load(dir.path(), prompt);
        assert_eq!(daemon.permission(), PermissionState::Default);

        let (prompt, _) = counting_prompt(true);
        let cli = DesktopNotifier::load(dir.path(), prompt);
        cli.request_permission().await;

        assert_eq!(daemon.permission(), PermissionState::Granted);
    }

    #[tokio::test]
    async fn denied_is_terminal() {
        let dir = TempDir::new().unwrap();
        let (prompt, calls) = counting_prompt(false);

        let notifier = DesktopNotifier::load(dir.path(), prompt);
        assert_eq!(notifier.request_permission().await, PermissionState::Denied);
        assert_eq!(notifier.request_permission().await, PermissionState::Denied);

        // Second request must not ask again.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn show_without_permission_fails_before_touching_platform() {
        let dir = TempDir::new().unwrap();
        let (prompt, _) = counting_prompt(true);
        let notifier = DesktopNotifier::load(dir.path(), prompt);

        let result = notifier
            .show("Title", "Body", &NotificationOptions::reminder("tag"))
            .await;
        assert!(matches!(
            result,
            Err(NotifyError::NotPermitted(PermissionState::Default))
        ));
    }

    #[test]
    fn reminder_notification_stays_until_dismissed() {
        let notification = build_notification(
            "Task due today",
            "Lab report (CSE220) is due today at 23:00.",
            &NotificationOptions::reminder("task-t1-today"),
        );

        assert_eq!(notification.summary, "Task due today");
        assert_eq!(notification.appname, APP_NAME);
        assert_eq!(notification.timeout, Timeout::Never);
        #[cfg(all(unix, not(target_os = "macos")))]
        assert!(notification.hints.contains(&Hint::Resident(true)));
    }
}
