//! The ringing surface: what the user sees while the alarm goes off.
//!
//! Dismiss and snooze are single-flight. While one is in progress every
//! further tap is ignored. A failed action clears the guard, puts the surface
//! back into [`RingingPhase::Ringing`] and records a message for the user.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::AlarmError;
use crate::scheduler::AlarmScheduler;
use crate::snooze::SnoozeCoordinator;
use crate::store::AlarmStore;
use crate::timer::ExactTimerPort;
use crate::types::{AlarmFired, AlarmRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingingPhase {
    Ringing,
    Cancelling,
    Snoozing,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingingOutcome {
    /// Another action was already in flight.
    Ignored,
    Dismissed,
    Snoozed(AlarmRecord),
}

#[derive(Debug)]
struct SurfaceState {
    fired: Option<AlarmFired>,
    phase: RingingPhase,
    error: Option<String>,
}

pub struct RingingSurface<S, T> {
    scheduler: Arc<AlarmScheduler<S, T>>,
    snooze: Arc<SnoozeCoordinator<S, T>>,
    state: Mutex<SurfaceState>,
    in_flight: AtomicBool,
}

impl<S, T> RingingSurface<S, T>
where
    S: AlarmStore + 'static,
    T: ExactTimerPort + 'static,
{
    pub fn new(scheduler: Arc<AlarmScheduler<S, T>>, snooze: Arc<SnoozeCoordinator<S, T>>) -> Self {
        Self {
            scheduler,
            snooze,
            state: Mutex::new(SurfaceState {
                fired: None,
                phase: RingingPhase::Idle,
                error: None,
            }),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Shows (or replaces) the ringing alarm.
    pub fn show(&self, fired: AlarmFired) {
        self.update(|state| {
            state.fired = Some(fired);
            state.phase = RingingPhase::Ringing;
            state.error = None;
        });
    }

    pub fn phase(&self) -> RingingPhase {
        self.state
            .lock()
            .map(|state| state.phase)
            .unwrap_or(RingingPhase::Idle)
    }

    pub fn fired(&self) -> Option<AlarmFired> {
        self.state.lock().ok().and_then(|state| state.fired.clone())
    }

    /// The message from the last failed action, if any.
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().ok().and_then(|state| state.error.clone())
    }

    /// Cancels the alarm and closes the surface.
    ///
    /// ## Errors
    ///
    /// Returns the scheduler error; the surface keeps ringing.
    pub async fn dismiss(&self) -> Result<RingingOutcome, AlarmError> {
        if !self.begin(RingingPhase::Cancelling) {
            return Ok(RingingOutcome::Ignored);
        }

        match self.scheduler.cancel_alarm().await {
            Ok(()) => {
                self.finish();
                Ok(RingingOutcome::Dismissed)
            }
            Err(err) => {
                self.fail(format!("Unable to dismiss alarm: {err}"));
                Err(err)
            }
        }
    }

    /// Snoozes the alarm and closes the surface.
    ///
    /// ## Errors
    ///
    /// Returns the snooze error; the surface keeps ringing.
    pub async fn snooze(&self) -> Result<RingingOutcome, AlarmError> {
        if !self.begin(RingingPhase::Snoozing) {
            return Ok(RingingOutcome::Ignored);
        }

        match self.snooze.snooze_now().await {
            Ok(record) => {
                self.finish();
                Ok(RingingOutcome::Snoozed(record))
            }
            Err(err) => {
                self.fail(format!("Unable to snooze alarm: {err}"));
                Err(err)
            }
        }
    }

    /// Shows every payload published on `launches` until the channel closes.
    pub fn follow(self: &Arc<Self>, mut launches: watch::Receiver<Option<AlarmFired>>) -> JoinHandle<()> {
        let surface = Arc::clone(self);
        tokio::spawn(async move {
            while launches.changed().await.is_ok() {
                let fired = launches.borrow_and_update().clone();
                if let Some(fired) = fired {
                    surface.show(fired);
                }
            }
        })
    }

    fn begin(&self, phase: RingingPhase) -> bool {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!(?phase, "ringing action already in flight");
            return false;
        }
        self.update(|state| {
            state.phase = phase;
            state.error = None;
        });
        true
    }

    fn finish(&self) {
        self.update(|state| {
            state.phase = RingingPhase::Idle;
            state.fired = None;
        });
        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn fail(&self, message: String) {
        warn!(%message, "ringing action failed");
        self.update(|state| {
            state.phase = RingingPhase::Ringing;
            state.error = Some(message);
        });
        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn update(&self, f: impl FnOnce(&mut SurfaceState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduler::SchedulerOptions;
    use crate::store::MemoryStore;
    use crate::timer::TokioTimerPort;
    use crate::types::AlarmIntent;
    use tokio::sync::mpsc;

    const NOW: i64 = 1_767_250_000_000;

    type Surface = RingingSurface<MemoryStore, TokioTimerPort>;

    fn surface() -> (Arc<Surface>, Arc<AlarmScheduler<MemoryStore, TokioTimerPort>>, mpsc::Receiver<AlarmIntent>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let (tx, rx) = mpsc::channel(8);
        let scheduler = Arc::new(AlarmScheduler::new(
            MemoryStore::new(),
            TokioTimerPort::new(tx, clock.clone()),
            clock,
            SchedulerOptions::default(),
        ));
        let snooze = Arc::new(SnoozeCoordinator::new(Arc::clone(&scheduler)));
        (
            Arc::new(RingingSurface::new(Arc::clone(&scheduler), snooze)),
            scheduler,
            rx,
        )
    }

    fn fired(label: &str) -> AlarmFired {
        AlarmFired {
            trigger_at_millis: NOW,
            label: Some(label.to_string()),
            is_snooze: false,
        }
    }

    #[tokio::test]
    async fn show_enters_ringing_and_replaces_payload() {
        let (surface, _scheduler, _rx) = surface();
        assert_eq!(surface.phase(), RingingPhase::Idle);

        surface.show(fired("first"));
        surface.show(fired("second"));

        assert_eq!(surface.phase(), RingingPhase::Ringing);
        assert_eq!(surface.fired().unwrap().label.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn dismiss_cancels_alarm() {
        let (surface, scheduler, _rx) = surface();
        scheduler.schedule_alarm(NOW + 1_000, None, false).await.unwrap();
        surface.show(fired("Wake up"));

        assert_eq!(surface.dismiss().await.unwrap(), RingingOutcome::Dismissed);
        assert_eq!(surface.phase(), RingingPhase::Idle);
        assert_eq!(scheduler.current_alarm().await.unwrap(), None);
    }

    #[tokio::test]
    async fn snooze_rearms_and_goes_idle() {
        let (surface, scheduler, _rx) = surface();
        scheduler
            .schedule_alarm(NOW + 1_000, Some("Wake up".into()), false)
            .await
            .unwrap();
        surface.show(fired("Wake up"));

        let outcome = surface.snooze().await.unwrap();
        assert_eq!(
            outcome,
            RingingOutcome::Snoozed(AlarmRecord::new(NOW + 540_000, Some("Wake up".into()), true))
        );
        assert_eq!(surface.phase(), RingingPhase::Idle);
    }

    #[tokio::test]
    async fn second_tap_while_in_flight_is_ignored() {
        let (surface, scheduler, _rx) = surface();
        surface.show(fired("Wake up"));

        // hold the slot so the first dismiss parks inside the scheduler
        let guard = scheduler.lock_slot().await;
        let first = {
            let surface = Arc::clone(&surface);
            tokio::spawn(async move { surface.dismiss().await })
        };
        while surface.phase() != RingingPhase::Cancelling {
            tokio::task::yield_now().await;
        }

        assert_eq!(surface.snooze().await.unwrap(), RingingOutcome::Ignored);
        assert_eq!(surface.dismiss().await.unwrap(), RingingOutcome::Ignored);

        drop(guard);
        assert_eq!(first.await.unwrap().unwrap(), RingingOutcome::Dismissed);
    }

    #[tokio::test]
    async fn failed_snooze_keeps_ringing_and_allows_retry() {
        let (surface, scheduler, _rx) = surface();
        let ringing = scheduler
            .schedule_alarm(NOW + 1_000, Some("Wake up".into()), false)
            .await
            .unwrap();
        surface.show(fired("Wake up"));
        scheduler.timer().set_exact_allowed(false);

        let err = surface.snooze().await.unwrap_err();
        assert!(matches!(err, AlarmError::PermissionDenied));
        assert_eq!(surface.phase(), RingingPhase::Ringing);
        assert!(surface.last_error().unwrap().contains("Unable to snooze alarm"));
        assert_eq!(scheduler.current_alarm().await.unwrap(), Some(ringing));

        scheduler.timer().set_exact_allowed(true);
        assert_eq!(
            surface.snooze().await.unwrap(),
            RingingOutcome::Snoozed(AlarmRecord::new(NOW + 540_000, Some("Wake up".into()), true))
        );
        assert_eq!(surface.last_error(), None);
    }

    #[tokio::test]
    async fn follow_shows_launched_payloads() {
        let (surface, _scheduler, _rx) = surface();
        let (tx, rx) = watch::channel(None);
        let task = surface.follow(rx);

        tx.send_replace(Some(fired("from timer")));
        while surface.phase() != RingingPhase::Ringing {
            tokio::task::yield_now().await;
        }
        assert_eq!(surface.fired().unwrap().label.as_deref(), Some("from timer"));

        drop(tx);
        task.await.unwrap();
    }
}
