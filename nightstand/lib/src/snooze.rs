//! Snooze: cancel the ringing alarm and re-arm it a fixed interval later.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::clock::Clock;
use crate::error::AlarmError;
use crate::scheduler::AlarmScheduler;
use crate::store::AlarmStore;
use crate::timer::ExactTimerPort;
use crate::types::{AlarmRecord, DEFAULT_SNOOZE_INTERVAL_MILLIS};

/// Re-arms the current alarm one snooze interval from now.
pub struct SnoozeCoordinator<S, T> {
    scheduler: Arc<AlarmScheduler<S, T>>,
    interval_millis: i64,
}

impl<S: AlarmStore, T: ExactTimerPort> SnoozeCoordinator<S, T> {
    /// A coordinator using the default 9-minute interval.
    pub fn new(scheduler: Arc<AlarmScheduler<S, T>>) -> Self {
        Self {
            scheduler,
            interval_millis: DEFAULT_SNOOZE_INTERVAL_MILLIS,
        }
    }

    /// Replaces the snooze interval.
    ///
    /// ## Errors
    ///
    /// Returns [`AlarmError::InvalidSnoozeInterval`] for a zero interval,
    /// which could never be scheduled.
    pub fn with_interval(mut self, interval: Duration) -> Result<Self, AlarmError> {
        let interval_millis = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        if interval_millis <= 0 {
            return Err(AlarmError::InvalidSnoozeInterval { interval_millis });
        }
        self.interval_millis = interval_millis;
        Ok(self)
    }

    pub fn interval_millis(&self) -> i64 {
        self.interval_millis
    }

    /// Cancels the current alarm and schedules `now_millis + interval` with
    /// the same label and the snooze flag set.
    ///
    /// With no current alarm the new one has no label. The whole sequence
    /// holds the slot lock, so no other schedule or cancel can land between
    /// the cancel and the re-arm.
    ///
    /// ## Errors
    ///
    /// [`AlarmError::InvalidTime`] and [`AlarmError::PermissionDenied`] are
    /// checked before the current alarm is touched. A store or timer error
    /// during the re-arm leaves no alarm armed.
    pub async fn snooze(&self, now_millis: i64) -> Result<AlarmRecord, AlarmError> {
        let guard = self.scheduler.lock_slot().await;

        let trigger_at_millis = now_millis.saturating_add(self.interval_millis);
        let clock_now = self.scheduler.clock().now_millis();
        if trigger_at_millis <= clock_now {
            return Err(AlarmError::InvalidTime {
                trigger_at_millis,
                now_millis: clock_now,
            });
        }
        if !self.scheduler.can_schedule_exact_alarms() {
            return Err(AlarmError::PermissionDenied);
        }

        let label = self
            .scheduler
            .store()
            .load()
            .await?
            .and_then(|record| record.label);

        self.scheduler.cancel_locked(&guard).await?;

        let record = self
            .scheduler
            .schedule_locked(&guard, trigger_at_millis, label, true)
            .await?;

        info!(
            trigger_at = record.trigger_at_millis,
            interval_ms = self.interval_millis,
            "alarm snoozed"
        );
        Ok(record)
    }

    /// [`snooze`](Self::snooze) from the scheduler's clock.
    ///
    /// ## Errors
    ///
    /// Same as [`snooze`](Self::snooze).
    pub async fn snooze_now(&self) -> Result<AlarmRecord, AlarmError> {
        let now = self.scheduler.clock().now_millis();
        self.snooze(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::scheduler::SchedulerOptions;
    use crate::store::MemoryStore;
    use crate::timer::TokioTimerPort;
    use crate::types::{AlarmIntent, TimerToken};
    use tokio::sync::mpsc;

    const NOW: i64 = 1_767_250_000_000;

    fn coordinator() -> (
        SnoozeCoordinator<MemoryStore, TokioTimerPort>,
        Arc<AlarmScheduler<MemoryStore, TokioTimerPort>>,
        mpsc::Receiver<AlarmIntent>,
    ) {
        let clock = Arc::new(ManualClock::new(NOW));
        let (tx, rx) = mpsc::channel(8);
        let scheduler = Arc::new(AlarmScheduler::new(
            MemoryStore::new(),
            TokioTimerPort::new(tx, clock.clone()),
            clock,
            SchedulerOptions::default(),
        ));
        (SnoozeCoordinator::new(Arc::clone(&scheduler)), scheduler, rx)
    }

    #[tokio::test]
    async fn snooze_preserves_label_and_sets_flag() {
        let (snooze, scheduler, _rx) = coordinator();
        scheduler
            .schedule_alarm(NOW + 1_000, Some("L".into()), false)
            .await
            .unwrap();

        let record = snooze.snooze(NOW).await.unwrap();

        assert_eq!(record, AlarmRecord::new(NOW + 540_000, Some("L".into()), true));
        assert_eq!(scheduler.current_alarm().await.unwrap(), Some(record));
        assert_eq!(
            scheduler.timer().pending_trigger(&TimerToken::alarm()),
            Some(NOW + 540_000)
        );
    }

    #[tokio::test]
    async fn snooze_without_alarm_has_no_label() {
        let (snooze, scheduler, _rx) = coordinator();

        let record = snooze.snooze(NOW).await.unwrap();

        assert_eq!(record, AlarmRecord::new(NOW + 540_000, None, true));
        assert_eq!(scheduler.timer().armed_count(), 1);
    }

    #[tokio::test]
    async fn custom_interval_is_used() {
        let (snooze, _scheduler, _rx) = coordinator();
        let snooze = snooze.with_interval(Duration::from_secs(5 * 60)).unwrap();

        let record = snooze.snooze_now().await.unwrap();
        assert_eq!(record.trigger_at_millis, NOW + 300_000);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let (snooze, _scheduler, _rx) = coordinator();

        let err = snooze.with_interval(Duration::ZERO).err().unwrap();
        assert!(matches!(
            err,
            AlarmError::InvalidSnoozeInterval { interval_millis: 0 }
        ));
    }

    #[tokio::test]
    async fn permission_error_leaves_current_alarm_untouched() {
        let (snooze, scheduler, _rx) = coordinator();
        let current = scheduler
            .schedule_alarm(NOW + 1_000, Some("L".into()), false)
            .await
            .unwrap();
        scheduler.timer().set_exact_allowed(false);

        let err = snooze.snooze(NOW).await.unwrap_err();

        assert!(matches!(err, AlarmError::PermissionDenied));
        assert_eq!(scheduler.current_alarm().await.unwrap(), Some(current));
        assert_eq!(
            scheduler.timer().pending_trigger(&TimerToken::alarm()),
            Some(NOW + 1_000)
        );
    }

    #[tokio::test]
    async fn snooze_from_a_stale_instant_is_rejected_before_cancel() {
        let (snooze, scheduler, _rx) = coordinator();
        let current = scheduler
            .schedule_alarm(NOW + 1_000, Some("L".into()), false)
            .await
            .unwrap();

        let err = snooze.snooze(NOW - 600_000).await.unwrap_err();

        assert!(matches!(err, AlarmError::InvalidTime { .. }));
        assert_eq!(scheduler.current_alarm().await.unwrap(), Some(current));
    }
}
