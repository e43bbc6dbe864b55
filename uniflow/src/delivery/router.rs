//! Delivery router.
//!
//! Picks the best available channel for each reminder:
//!
//! 1. The worker surface (push relay), if configured and ready.
//! 2. Otherwise a system notification, if permission is granted.
//! 3. A toast, when neither of the above delivered, and additionally whenever
//!    the app is visible.
//!
//! Channel errors are logged and treated as "unavailable". Delivery never
//! fails from the caller's point of view; when nothing can show the reminder
//! it is dropped.

use std::sync::Arc;

use tracing::{debug, warn};

use super::capability::{
    NotificationCapability, NotificationOptions, PermissionState, WorkerSurface,
};
use super::toast::{ToastQueue, Visibility, VisibilityFlag};

/// Tag used when the caller supplies none.
const DEFAULT_TAG: &str = "uniflow-reminder";

/// A channel that presented a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Worker,
    System,
    Toast,
}

/// Channels that accepted a reminder, in the order they were used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub channels: Vec<Channel>,
}

impl DeliveryReport {
    /// True when no channel presented the reminder.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.channels.is_empty()
    }

    #[must_use]
    pub fn used(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }
}

/// Routes reminders to the worker surface, system notifications, or toasts.
#[derive(Clone)]
pub struct DeliveryRouter {
    worker: Option<Arc<dyn WorkerSurface>>,
    system: Option<Arc<dyn NotificationCapability>>,
    toasts: Option<ToastQueue>,
    visibility: Arc<dyn Visibility>,
}

impl DeliveryRouter {
    /// Creates a router with no channels. Attach channels with the `with_*`
    /// methods.
    #[must_use]
    pub fn new(visibility: Arc<dyn Visibility>) -> Self {
        Self {
            worker: None,
            system: None,
            toasts: None,
            visibility,
        }
    }

    #[must_use]
    pub fn with_worker(mut self, worker: Arc<dyn WorkerSurface>) -> Self {
        self.worker = Some(worker);
        self
    }

    #[must_use]
    pub fn with_system(mut self, system: Arc<dyn NotificationCapability>) -> Self {
        self.system = Some(system);
        self
    }

    #[must_use]
    pub fn with_toasts(mut self, toasts: ToastQueue) -> Self {
        self.toasts = Some(toasts);
        self
    }

    /// Permission state of the system channel, `Denied` when none is attached.
    #[must_use]
    pub fn system_permission(&self) -> PermissionState {
        self.system
            .as_ref()
            .map_or(PermissionState::Denied, |system| system.permission())
    }

    /// Delivers a reminder with default presentation options.
    pub async fn deliver(&self, title: &str, body: &str) -> DeliveryReport {
        self.deliver_with(title, body, &NotificationOptions::reminder(DEFAULT_TAG))
            .await
    }

    /// Delivers a reminder through the best available channel.
    pub async fn deliver_with(
        &self,
        title: &str,
        body: &str,
        options: &NotificationOptions,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        if self.try_worker(title, body, options).await {
            report.channels.push(Channel::Worker);
        } else if self.try_system(title, body, options).await {
            report.channels.push(Channel::System);
        }

        let delivered_outside_app = !report.is_dropped();
        if !delivered_outside_app || self.visibility.is_visible() {
            if let Some(toasts) = &self.toasts {
                toasts.push(title, body);
                report.channels.push(Channel::Toast);
            }
        }

        if report.is_dropped() {
            debug!(tag = %options.tag, "No delivery channel available, reminder dropped");
        } else {
            debug!(tag = %options.tag, channels = ?report.channels, "Reminder delivered");
        }

        report
    }

    async fn try_worker(&self, title: &str, body: &str, options: &NotificationOptions) -> bool {
        let Some(worker) = self.worker.as_ref().filter(|worker| worker.is_ready()) else {
            return false;
        };

        match worker.show_notification(title, body, options).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Worker surface failed, falling back");
                false
            }
        }
    }

    async fn try_system(&self, title: &str, body: &str, options: &NotificationOptions) -> bool {
        let Some(system) = self
            .system
            .as_ref()
            .filter(|system| system.permission() == PermissionState::Granted)
        else {
            return false;
        };

        match system.show(title, body, options).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "System notification failed, falling back");
                false
            }
        }
    }
}

impl Default for DeliveryRouter {
    /// A router with only an in-app toast queue and the app marked visible.
    fn default() -> Self {
        Self::new(Arc::new(VisibilityFlag::new(true))).with_toasts(ToastQueue::default())
    }
}
