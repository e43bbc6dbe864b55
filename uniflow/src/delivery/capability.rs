//! Notification capability abstractions.
//!
//! Two traits describe the operating-system facing channels the router can
//! use:
//!
//! - [`WorkerSurface`]: a background delivery surface that keeps working when
//!   the app is not in the foreground (the push relay).
//! - [`NotificationCapability`]: permission-gated system notifications (the
//!   desktop notifier).
//!
//! Both return boxed futures so that implementations can be stored as trait
//! objects and swapped for fakes in tests.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Vibration pattern attached to every reminder, in milliseconds.
pub const DEFAULT_VIBRATE_PATTERN: [u32; 3] = [200, 100, 200];

/// Permission to show system notifications.
///
/// Moves out of `Default` only through an explicit user request.
/// `Denied` is terminal: later requests return `Denied` without asking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// The user has not been asked yet.
    #[default]
    Default,
    Granted,
    Denied,
}

impl PermissionState {
    /// Applies the outcome of a permission prompt.
    ///
    /// Only `Default` can change; `Granted` and `Denied` are returned as is.
    #[must_use]
    pub fn after_prompt(self, allowed: bool) -> Self {
        match self {
            PermissionState::Default if allowed => PermissionState::Granted,
            PermissionState::Default => PermissionState::Denied,
            settled => settled,
        }
    }

    /// Whether asking the user could change the state.
    #[must_use]
    pub fn can_prompt(&self) -> bool {
        matches!(self, PermissionState::Default)
    }
}

/// Presentation hints passed along with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
    /// Replaces an earlier notification with the same tag at the OS level.
    pub tag: String,

    /// Vibration pattern for devices that support it.
    pub vibrate: Vec<u32>,

    /// Keep the notification on screen until the user dismisses it.
    pub require_interaction: bool,
}

impl NotificationOptions {
    /// Options used for reminders: the given tag, the default vibration
    /// pattern, and a notification that stays until dismissed.
    #[must_use]
    pub fn reminder(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            vibrate: DEFAULT_VIBRATE_PATTERN.to_vec(),
            require_interaction: true,
        }
    }
}

/// Errors raised by notification channels.
///
/// These never reach the user: the router logs them and moves on to the next
/// channel.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The channel is not available on this platform or not configured.
    #[error("notification channel unsupported: {0}")]
    Unsupported(String),

    /// Permission has not been granted.
    #[error("notification permission is {0:?}")]
    NotPermitted(PermissionState),

    /// The platform rejected the display request.
    #[error("failed to display notification: {0}")]
    Display(String),

    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Relay returned a non-success status.
    #[error("relay error: {status} - {message}")]
    Relay { status: u16, message: String },

    /// Reading or writing the stored permission failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A delivery surface that works independently of app focus.
pub trait WorkerSurface: Send + Sync {
    /// True when the surface is configured and can accept notifications now.
    fn is_ready(&self) -> bool;

    /// Hands a notification to the surface.
    fn show_notification<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        options: &'a NotificationOptions,
    ) -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// Permission-gated system notifications.
pub trait NotificationCapability: Send + Sync {
    /// Current permission state.
    fn permission(&self) -> PermissionState;

    /// Asks the user for permission if that can still change anything, and
    /// returns the resulting state.
    fn request_permission(&self) -> BoxFuture<'_, PermissionState>;

    /// Displays a notification. Callers check [`permission`](Self::permission)
    /// first; implementations may still fail.
    fn show<'a>(
        &'a self,
        title: &'a str,
        body: &'a str,
        options: &'a NotificationOptions,
    ) -> BoxFuture<'a, Result<(), NotifyError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_moves_default_only() {
        assert_eq!(
            PermissionState::Default.after_prompt(true),
            PermissionState::Granted
        );
        assert_eq!(
            PermissionState::Default.after_prompt(false),
            PermissionState::Denied
        );
        assert_eq!(
            PermissionState::Denied.after_prompt(true),
            PermissionState::Denied
        );
        assert_eq!(
            PermissionState::Granted.after_prompt(false),
            PermissionState::Granted
        );
    }

    #[test]
    fn only_default_can_prompt() {
        assert!(PermissionState::Default.can_prompt());
        assert!(!PermissionState::Granted.can_prompt());
        assert!(!PermissionState::Denied.can_prompt());
    }

    #[test]
    fn permission_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PermissionState::Granted).unwrap(),
            "\"granted\""
        );
        assert_eq!(
            serde_json::from_str::<PermissionState>("\"default\"").unwrap(),
            PermissionState::Default
        );
    }

    #[test]
    fn reminder_options_stay_until_dismissed() {
        let options = NotificationOptions::reminder("task-t1-1h");
        assert_eq!(options.tag, "task-t1-1h");
        assert_eq!(options.vibrate, vec![200, 100, 200]);
        assert!(options.require_interaction);
    }
}
