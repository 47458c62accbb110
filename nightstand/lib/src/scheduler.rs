//! The alarm scheduler.
//!
//! Owns the single alarm slot: the persisted [`AlarmRecord`] and the exact
//! timer armed for it. Every write to either half happens under one slot
//! lock, so schedule, cancel, snooze and reconciliation never interleave.
//!
//! Ordering rules:
//!
//! 1. Validation (time in the future, exact-alarm permission) happens before
//!    any side effect.
//! 2. The record is persisted before the timer is armed. If arming fails the
//!    previous record is restored, so a failed schedule leaves no trace.
//! 3. Cancel clears the record first, then the timer.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::AlarmError;
use crate::store::AlarmStore;
use crate::timer::{ExactAlarmGate, ExactTimerPort};
use crate::types::{AlarmRecord, PendingAlarm, TimerToken};

/// Scheduler settings taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Ask the timer service to present the alarm as an alarm clock.
    pub use_alarm_clock_ui: bool,
    /// Whether exact alarms need a runtime permission.
    pub gate: ExactAlarmGate,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            use_alarm_clock_ui: true,
            gate: ExactAlarmGate::default(),
        }
    }
}

/// Result of comparing the persisted alarm with the armed timer at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Record and timer already agree (or both are absent).
    InSync,
    /// A future record had no matching timer; it was armed again.
    Rearmed(AlarmRecord),
    /// The record's time passed while nothing was armed; it was cleared.
    Missed(AlarmRecord),
    /// A timer was armed with no record behind it; it was cancelled.
    OrphanCancelled,
}

/// Proof that the caller holds the slot lock.
pub(crate) struct SlotGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Schedules, cancels and inspects the single alarm.
///
/// ## Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use nightstand_lib::{AlarmScheduler, MemoryStore, SchedulerOptions, SystemClock, TokioTimerPort};
/// use tokio::sync::mpsc;
///
/// # async fn example() -> Result<(), nightstand_lib::AlarmError> {
/// let clock = Arc::new(SystemClock);
/// let (tx, _rx) = mpsc::channel(8);
/// let timer = TokioTimerPort::new(tx, clock.clone());
/// let scheduler = AlarmScheduler::new(MemoryStore::new(), timer, clock, SchedulerOptions::default());
///
/// let record = scheduler.schedule_alarm(1_767_250_800_000, Some("Wake up".into()), false).await?;
/// assert_eq!(scheduler.current_alarm().await?, Some(record));
/// # Ok(())
/// # }
/// ```
pub struct AlarmScheduler<S, T> {
    store: S,
    timer: T,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
    slot: Mutex<()>,
}

impl<S: AlarmStore, T: ExactTimerPort> AlarmScheduler<S, T> {
    pub fn new(store: S, timer: T, clock: Arc<dyn Clock>, options: SchedulerOptions) -> Self {
        Self {
            store,
            timer,
            clock,
            options,
            slot: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Whether an exact alarm may be armed right now.
    pub fn can_schedule_exact_alarms(&self) -> bool {
        match self.options.gate {
            ExactAlarmGate::Ungated => true,
            ExactAlarmGate::Gated => self.timer.can_schedule_exact(),
        }
    }

    /// Persists and arms the alarm, replacing any existing one.
    ///
    /// ## Errors
    ///
    /// - [`AlarmError::InvalidTime`] if `trigger_at_millis` is not after now
    /// - [`AlarmError::PermissionDenied`] if exact alarms are not permitted
    /// - [`AlarmError::Store`] / [`AlarmError::Timer`] if persisting or arming
    ///   fails; the previous alarm is left in place
    pub async fn schedule_alarm(
        &self,
        trigger_at_millis: i64,
        label: Option<String>,
        is_snooze: bool,
    ) -> Result<AlarmRecord, AlarmError> {
        let guard = self.lock_slot().await;
        self.schedule_locked(&guard, trigger_at_millis, label, is_snooze)
            .await
    }

    /// Clears the persisted alarm and cancels its timer.
    ///
    /// A no-op when nothing is scheduled.
    ///
    /// ## Errors
    ///
    /// Returns [`AlarmError::Store`] if the record cannot be removed; the
    /// timer is then left armed.
    pub async fn cancel_alarm(&self) -> Result<(), AlarmError> {
        let guard = self.lock_slot().await;
        self.cancel_locked(&guard).await
    }

    /// The persisted alarm, if any.
    ///
    /// ## Errors
    ///
    /// Returns [`AlarmError::Store`] if the store cannot be read.
    pub async fn current_alarm(&self) -> Result<Option<AlarmRecord>, AlarmError> {
        Ok(self.store.load().await?)
    }

    /// Repairs drift between the persisted record and the armed timer.
    ///
    /// Meant to run once at startup, before the first alarm can fire.
    ///
    /// ## Errors
    ///
    /// Returns [`AlarmError::PermissionDenied`] if a future alarm needs to be
    /// re-armed but exact alarms are not permitted, or the store/timer error
    /// from the repair itself.
    pub async fn reconcile(&self) -> Result<Reconciliation, AlarmError> {
        let _guard = self.lock_slot().await;
        let token = TimerToken::alarm();
        let now = self.clock.now_millis();
        let record = self.store.load().await?;
        let pending = self.timer.pending_trigger(&token);

        let outcome = match (record, pending) {
            (None, None) => Reconciliation::InSync,
            (None, Some(_)) => {
                self.timer.cancel(&token).await;
                Reconciliation::OrphanCancelled
            }
            (Some(record), Some(armed)) if armed == record.trigger_at_millis => {
                Reconciliation::InSync
            }
            (Some(record), _) if record.trigger_at_millis > now => {
                if !self.can_schedule_exact_alarms() {
                    return Err(AlarmError::PermissionDenied);
                }
                self.timer
                    .schedule_exact_at(
                        record.trigger_at_millis,
                        PendingAlarm::for_record(&record),
                        self.options.use_alarm_clock_ui,
                    )
                    .await?;
                Reconciliation::Rearmed(record)
            }
            (Some(record), pending) => {
                self.store.clear().await?;
                if pending.is_some() {
                    self.timer.cancel(&token).await;
                }
                Reconciliation::Missed(record)
            }
        };

        match &outcome {
            Reconciliation::InSync => info!("alarm slot in sync"),
            Reconciliation::Rearmed(record) => {
                info!(trigger_at = record.trigger_at_millis, "re-armed persisted alarm")
            }
            Reconciliation::Missed(record) => {
                warn!(trigger_at = record.trigger_at_millis, "persisted alarm was missed")
            }
            Reconciliation::OrphanCancelled => warn!("cancelled alarm timer with no record"),
        }
        Ok(outcome)
    }

    pub(crate) async fn lock_slot(&self) -> SlotGuard<'_> {
        SlotGuard {
            _guard: self.slot.lock().await,
        }
    }

    pub(crate) async fn schedule_locked(
        &self,
        _guard: &SlotGuard<'_>,
        trigger_at_millis: i64,
        label: Option<String>,
        is_snooze: bool,
    ) -> Result<AlarmRecord, AlarmError> {
        let now_millis = self.clock.now_millis();
        if trigger_at_millis <= now_millis {
            return Err(AlarmError::InvalidTime {
                trigger_at_millis,
                now_millis,
            });
        }
        if !self.can_schedule_exact_alarms() {
            return Err(AlarmError::PermissionDenied);
        }

        let previous = self.store.load().await?;
        let record = AlarmRecord::new(trigger_at_millis, label, is_snooze);
        self.store.save(&record).await?;

        let armed = self
            .timer
            .schedule_exact_at(
                trigger_at_millis,
                PendingAlarm::for_record(&record),
                self.options.use_alarm_clock_ui,
            )
            .await;

        if let Err(err) = armed {
            error!(error = %err, trigger_at = trigger_at_millis, "failed to arm alarm, restoring previous");
            let restored = match &previous {
                Some(previous) => self.store.save(previous).await,
                None => self.store.clear().await,
            };
            if let Err(restore_err) = restored {
                error!(error = %restore_err, "failed to restore previous alarm");
            }
            return Err(err.into());
        }

        info!(
            trigger_at = trigger_at_millis,
            snooze = is_snooze,
            label = record.label.as_deref().unwrap_or(""),
            "alarm scheduled"
        );
        Ok(record)
    }

    pub(crate) async fn cancel_locked(&self, _guard: &SlotGuard<'_>) -> Result<(), AlarmError> {
        self.store.clear().await?;
        self.timer.cancel(&TimerToken::alarm()).await;
        info!("alarm cancelled");
        Ok(())
    }
}
