//! In-app toast banners.
//!
//! Toasts are the fallback channel: they need no permission and no network,
//! but are only seen while a UniFlow terminal is on screen. Each toast expires
//! after a fixed lifetime; expired toasts are pruned whenever the queue is
//! read or a new toast is pushed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::trace;

use crate::types::generate_id;

/// Default toast lifetime.
pub const DEFAULT_TOAST_LIFETIME: Duration = Duration::from_secs(5);

/// Capacity of the channel that announces new toasts to renderers.
const ANNOUNCE_CAPACITY: usize = 64;

/// A transient in-app banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: String,
    pub title: String,
    pub message: String,
    pub expires_at: Instant,
}

#[derive(Debug)]
struct ToastInner {
    active: Mutex<VecDeque<Toast>>,
    lifetime: Duration,
    announce: broadcast::Sender<Toast>,
}

/// Shared queue of active toasts.
///
/// Clones share the same queue.
#[derive(Debug, Clone)]
pub struct ToastQueue {
    inner: Arc<ToastInner>,
}

impl ToastQueue {
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        let (announce, _) = broadcast::channel(ANNOUNCE_CAPACITY);
        Self {
            inner: Arc::new(ToastInner {
                active: Mutex::new(VecDeque::new()),
                lifetime,
                announce,
            }),
        }
    }

    /// Adds a toast and announces it to subscribers. Returns its id.
    pub fn push(&self, title: impl Into<String>, message: impl Into<String>) -> String {
        let toast = Toast {
            id: generate_id(),
            title: title.into(),
            message: message.into(),
            expires_at: Instant::now() + self.inner.lifetime,
        };
        let id = toast.id.clone();

        {
            let mut active = self.lock();
            prune_expired(&mut active, Instant::now());
            active.push_back(toast.clone());
        }
        // No subscribers is fine: the toast is still listed by `active`.
        let _ = self.inner.announce.send(toast);

        trace!(toast_id = %id, "Toast queued");
        id
    }

    /// Removes a toast before it expires. Returns false if it was not active.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut active = self.lock();
        let before = active.len();
        active.retain(|toast| toast.id != id);
        active.len() != before
    }

    /// Toasts that have not yet expired, oldest first.
    #[must_use]
    pub fn active(&self) -> Vec<Toast> {
        let mut active = self.lock();
        prune_expired(&mut active, Instant::now());
        active.iter().cloned().collect()
    }

    /// Receives every toast pushed after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.inner.announce.subscribe()
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.inner.lifetime
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Toast>> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn prune_expired(active: &mut VecDeque<Toast>, now: Instant) {
    active.retain(|toast| toast.expires_at > now);
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TOAST_LIFETIME)
    }
}

/// Whether the app is currently in front of the user.
pub trait Visibility: Send + Sync {
    fn is_visible(&self) -> bool;
}

/// A visibility flag that can be flipped at runtime.
#[derive(Debug, Clone, Default)]
pub struct VisibilityFlag(Arc<AtomicBool>);

impl VisibilityFlag {
    #[must_use]
    pub fn new(visible: bool) -> Self {
        Self(Arc::new(AtomicBool::new(visible)))
    }

    pub fn set(&self, visible: bool) {
        self.0.store(visible, Ordering::SeqCst);
    }
}

impl Visibility for VisibilityFlag {
    fn is_visible(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    #[tokio::test(start_paused = true)]
    async fn toasts_expire_after_lifetime() {
        let queue = ToastQueue::new(Duration::from_secs(5));
        queue.push("Upcoming class", "CSE220 starts at 09:00.");
        assert_eq!(queue.active().len(), 1);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(queue.active().len(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(queue.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn push_prunes_expired_toasts() {
        let queue = ToastQueue::new(Duration::from_secs(5));
        queue.push("Upcoming class", "CSE220 starts at 09:00.");

        tokio::time::advance(Duration::from_secs(6)).await;
        queue.push("Task due today", "Lab report is due today.");

        let stored = queue.lock();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Task due today");
    }

    #[test]
    fn subscribers_are_woken_by_new_toasts() {
        let queue = ToastQueue::default();
        let mut rx = queue.subscribe();
        let mut next = task::spawn(rx.recv());
        assert_pending!(next.poll());

        let id = queue.push("Task due today", "Lab report is due today.");
        assert!(next.is_woken());

        let toast = assert_ready_ok!(next.poll());
        assert_eq!(toast.id, id);
        assert_eq!(toast.title, "Task due today");
    }

    #[test]
    fn dismiss_removes_only_the_named_toast() {
        let queue = ToastQueue::default();
        let first = queue.push("a", "1");
        queue.push("b", "2");

        assert!(queue.dismiss(&first));
        assert!(!queue.dismiss(&first));
        assert_eq!(queue.active().len(), 1);
    }

    #[test]
    fn visibility_flag_is_shared() {
        let flag = VisibilityFlag::new(false);
        let shared = flag.clone();
        shared.set(true);
        assert!(flag.is_visible());
    }
}
