//! Reminder scheduler.
//!
//! Polls the rule set on a fixed period while notifications are enabled. Each
//! tick snapshots the state, evaluates the rules against the injected clock,
//! and hands every reminder not yet in the dedup ledger to the delivery
//! router.
//!
//! The timer is a single background task. Stopping signals it to cancel: a
//! tick that is already delivering runs to completion, and no new tick starts
//! after [`ReminderScheduler::stop`] returns. The ledger outlives restarts: a
//! reminder fired before a settings change is not fired again after it.
//!
//! Ticks that fall behind (a suspended machine, a blocked runtime) are
//! skipped rather than replayed, so reminders whose window passed in the
//! meantime are lost.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::ledger::DedupLedger;
use super::rules::{self, Reminder};
use crate::clock::Clock;
use crate::delivery::{DeliveryRouter, NotificationOptions};
use crate::state::StateContainer;

/// Default polling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Everything a tick needs, shared between the scheduler and its timer task.
#[derive(Clone)]
struct Engine {
    state: StateContainer,
    router: DeliveryRouter,
    clock: Arc<dyn Clock>,
    ledger: Arc<Mutex<DedupLedger>>,
}

impl Engine {
    async fn tick(&self) -> Vec<Reminder> {
        let snapshot = self.state.snapshot().await;
        let now = self.clock.now();

        let mut fired = Vec::new();
        for reminder in rules::evaluate_state(now, &snapshot) {
            let fresh = self
                .ledger
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .mark_fired(reminder.key.clone());
            if !fresh {
                continue;
            }

            let report = self
                .router
                .deliver_with(
                    &reminder.title,
                    &reminder.body,
                    &NotificationOptions::reminder(reminder.key.clone()),
                )
                .await;
            info!(
                key = %reminder.key,
                kind = ?reminder.kind,
                channels = ?report.channels,
                "Reminder fired"
            );
            fired.push(reminder);
        }

        fired
    }
}

/// A running timer task and the signal that cancels it.
struct Timer {
    handle: JoinHandle<()>,
    cancel: oneshot::Sender<()>,
}

/// Owns the reminder timer.
pub struct ReminderScheduler {
    engine: Engine,
    period: Duration,
    timer: Option<Timer>,
}

impl ReminderScheduler {
    #[must_use]
    pub fn new(state: StateContainer, router: DeliveryRouter, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: Engine {
                state,
                router,
                clock,
                ledger: Arc::new(Mutex::new(DedupLedger::new())),
            },
            period: DEFAULT_POLL_INTERVAL,
            timer: None,
        }
    }

    /// Sets the polling period. Takes effect on the next start.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Uses an existing ledger instead of a fresh one.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<Mutex<DedupLedger>>) -> Self {
        self.engine.ledger = ledger;
        self
    }

    #[must_use]
    pub fn ledger(&self) -> Arc<Mutex<DedupLedger>> {
        Arc::clone(&self.engine.ledger)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer
            .as_ref()
            .is_some_and(|timer| !timer.handle.is_finished())
    }

    /// Starts the timer if notifications are enabled. Any running timer is
    /// stopped first. Returns whether a timer is now running.
    ///
    /// The first tick happens one period after starting.
    pub fn start(&mut self) -> bool {
        self.stop();

        if !self.engine.state.preferences().enable_notifications {
            debug!("Notifications disabled, reminder timer not started");
            return false;
        }

        let engine = self.engine.clone();
        let period = self.period;
        let (cancel, mut cancelled) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                // Cancellation is only observed between ticks.
                tokio::select! {
                    biased;
                    _ = &mut cancelled => break,
                    _ = interval.tick() => {}
                }
                engine.tick().await;
            }
            debug!("Reminder timer finished");
        });
        self.timer = Some(Timer { handle, cancel });

        info!(period_secs = period.as_secs(), "Reminder timer started");
        true
    }

    /// Stops the timer. No new tick starts after this returns; a tick that is
    /// already delivering finishes in the background.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            // The task may have exited already; nothing to cancel then.
            let _ = timer.cancel.send(());
            debug!("Reminder timer stopped");
        }
    }

    /// Stops and starts again with the current preferences.
    pub fn restart(&mut self) -> bool {
        self.start()
    }

    /// Runs one evaluation immediately and returns the reminders it fired.
    pub async fn tick_once(&self) -> Vec<Reminder> {
        self.engine.tick().await
    }

    /// Runs the timer, restarting it on every preference change, until
    /// `shutdown` completes. The timer is stopped on return.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut preferences = self.engine.state.subscribe_preferences();
        self.start();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                changed = preferences.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    info!("Notification preferences changed, restarting reminder timer");
                    self.restart();
                }
            }
        }

        self.stop();
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::delivery::{NotifyError, ToastQueue, VisibilityFlag, WorkerSurface};
    use crate::types::{AppState, ClassSession, DayOfWeek};
    use chrono::NaiveDate;
    use futures::future::BoxFuture;

    /// A relay that takes a while and then gives up.
    struct SlowFailingWorker {
        delay: Duration,
    }

    impl WorkerSurface for SlowFailingWorker {
        fn is_ready(&self) -> bool {
            true
        }

        fn show_notification<'a>(
            &'a self,
            _title: &'a str,
            _body: &'a str,
            _options: &'a NotificationOptions,
        ) -> BoxFuture<'a, Result<(), NotifyError>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                Err(NotifyError::Display("relay timed out".to_string()))
            })
        }
    }

    fn monday_at(h: u32, m: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn state_with_class() -> StateContainer {
        StateContainer::new(AppState {
            schedule: vec![ClassSession {
                id: "cls1".to_string(),
                course_name: "Data Structures".to_string(),
                course_code: "CSE220".to_string(),
                faculty: "MMR".to_string(),
                room: "09A-06C".to_string(),
                day: DayOfWeek::Monday,
                start_time: "09:00".to_string(),
                end_time: "10:20".to_string(),
                color: None,
            }],
            ..AppState::default()
        })
    }

    fn scheduler(state: &StateContainer, clock: &ManualClock) -> (ReminderScheduler, ToastQueue) {
        let toasts = ToastQueue::new(Duration::from_secs(3600));
        let router = DeliveryRouter::new(Arc::new(VisibilityFlag::new(false)))
            .with_toasts(toasts.clone());
        let scheduler = ReminderScheduler::new(state.clone(), router, Arc::new(clock.clone()));
        (scheduler, toasts)
    }

    #[tokio::test]
    async fn tick_fires_each_key_once() {
        let state = state_with_class();
        let clock = ManualClock::new(monday_at(8, 30));
        let (scheduler, toasts) = scheduler(&state, &clock);

        let fired = scheduler.tick_once().await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].key, "class-cls1-Mon Jan 15 2024");

        clock.advance(chrono::Duration::seconds(20));
        assert!(scheduler.tick_once().await.is_empty());
        assert_eq!(toasts.active().len(), 1);
    }

    #[tokio::test]
    async fn disabled_notifications_do_not_start_timer() {
        let state = state_with_class();
        state
            .update_preferences(|prefs| prefs.enable_notifications = false)
            .await
            .unwrap();
        let clock = ManualClock::new(monday_at(8, 30));
        let (mut scheduler, _) = scheduler(&state, &clock);

        assert!(!scheduler.start());
        assert!(!scheduler.is_running());
        assert!(scheduler.tick_once().await.is_empty());
    }

    #[tokio::test]
    async fn ledger_survives_restart() {
        let state = state_with_class();
        let clock = ManualClock::new(monday_at(8, 30));
        let (mut scheduler, _) = scheduler(&state, &clock);

        assert!(scheduler.start());
        assert_eq!(scheduler.tick_once().await.len(), 1);

        assert!(scheduler.restart());
        assert!(scheduler.tick_once().await.is_empty());
        assert_eq!(scheduler.ledger().lock().unwrap().len(), 1);

        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_after_one_period() {
        let state = state_with_class();
        let clock = ManualClock::new(monday_at(8, 30));
        let (mut scheduler, toasts) = scheduler(&state, &clock);

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(toasts.active().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(toasts.active().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_lets_in_flight_delivery_finish() {
        let state = state_with_class();
        let clock = ManualClock::new(monday_at(8, 30));
        let toasts = ToastQueue::new(Duration::from_secs(3600));
        let router = DeliveryRouter::new(Arc::new(VisibilityFlag::new(false)))
            .with_worker(Arc::new(SlowFailingWorker {
                delay: Duration::from_secs(5),
            }))
            .with_toasts(toasts.clone());
        let mut scheduler = ReminderScheduler::new(state, router, Arc::new(clock.clone()));

        scheduler.start();
        // First tick at 60 s is now waiting on the worker.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(scheduler.ledger().lock().unwrap().len(), 1);
        assert!(toasts.active().is_empty());

        assert!(scheduler.restart());
        tokio::time::sleep(Duration::from_secs(10)).await;

        let active = toasts.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "Upcoming class: Data Structures");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_ticks() {
        let state = state_with_class();
        let clock = ManualClock::new(monday_at(8, 29));
        let (mut scheduler, toasts) = scheduler(&state, &clock);

        scheduler.start();
        scheduler.stop();
        clock.set(monday_at(8, 30));
        tokio::time::sleep(Duration::from_secs(121)).await;

        assert!(toasts.active().is_empty());
        assert!(!scheduler.is_running());
    }
}
