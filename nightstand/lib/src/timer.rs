//! Exact wake-up timers.
//!
//! [`ExactTimerPort`] is the seam to whatever can wake the device at an
//! absolute time. [`TokioTimerPort`] is the in-process implementation: one
//! tokio task per slot that sleeps until the trigger time and then delivers
//! an [`AlarmIntent`] through an `mpsc` channel.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use nightstand_lib::{AlarmRecord, ExactTimerPort, PendingAlarm, SystemClock, TokioTimerPort};
//! use tokio::sync::mpsc;
//!
//! # async fn example() {
//! let (tx, mut rx) = mpsc::channel(8);
//! let port = TokioTimerPort::new(tx, Arc::new(SystemClock));
//!
//! let record = AlarmRecord::new(1_767_250_800_000, Some("Wake up".into()), false);
//! port.schedule_exact_at(record.trigger_at_millis, PendingAlarm::for_record(&record), true)
//!     .await
//!     .unwrap();
//!
//! while let Some(intent) = rx.recv().await {
//!     println!("alarm fired: {:?}", intent.fired.label);
//! }
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::TimerError;
use crate::types::{AlarmIntent, PendingAlarm, TimerToken};

/// Whether exact alarms need an explicit permission on this device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExactAlarmGate {
    /// Exact alarms are always allowed.
    Ungated,
    /// Exact alarms are allowed only when the timer service says so.
    #[default]
    Gated,
}

/// Something that can fire a one-shot exact timer at an absolute time.
pub trait ExactTimerPort: Send + Sync {
    /// Arms `pending` at `trigger_at_millis`, replacing any timer on the same token.
    ///
    /// `use_alarm_clock_ui` asks for the alarm to be shown as an alarm clock
    /// where the platform supports it.
    ///
    /// ## Errors
    ///
    /// Returns an error if the timer cannot be armed.
    fn schedule_exact_at(
        &self,
        trigger_at_millis: i64,
        pending: PendingAlarm,
        use_alarm_clock_ui: bool,
    ) -> impl Future<Output = Result<(), TimerError>> + Send;

    /// Cancels the timer on `token`. A no-op when nothing is armed.
    fn cancel(&self, token: &TimerToken) -> impl Future<Output = ()> + Send;

    /// Whether exact timers are currently permitted.
    fn can_schedule_exact(&self) -> bool;

    /// Trigger time of the timer armed on `token`, if any.
    fn pending_trigger(&self, token: &TimerToken) -> Option<i64>;
}

struct ArmedTimer {
    generation: u64,
    trigger_at_millis: i64,
    handle: JoinHandle<()>,
}

type Slots = Arc<Mutex<HashMap<TimerToken, ArmedTimer>>>;

/// In-process exact timer backed by tokio.
pub struct TokioTimerPort {
    intent_tx: mpsc::Sender<AlarmIntent>,
    clock: Arc<dyn Clock>,
    slots: Slots,
    exact_allowed: AtomicBool,
    generation: AtomicU64,
}

impl TokioTimerPort {
    /// Creates a timer port delivering fired alarms to `intent_tx`.
    #[must_use]
    pub fn new(intent_tx: mpsc::Sender<AlarmIntent>, clock: Arc<dyn Clock>) -> Self {
        Self {
            intent_tx,
            clock,
            slots: Arc::default(),
            exact_allowed: AtomicBool::new(true),
            generation: AtomicU64::new(0),
        }
    }

    /// Grants or revokes the exact-timer permission.
    pub fn set_exact_allowed(&self, allowed: bool) {
        self.exact_allowed.store(allowed, Ordering::SeqCst);
    }

    /// Number of armed timers.
    pub fn armed_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    async fn fire(
        slots: Slots,
        token: TimerToken,
        generation: u64,
        deadline: Instant,
        intent: AlarmIntent,
        tx: mpsc::Sender<AlarmIntent>,
    ) {
        sleep_until(deadline).await;

        // only forget the slot if it was not re-armed meanwhile
        if let Ok(mut slots) = slots.lock() {
            if slots
                .get(&token)
                .is_some_and(|armed| armed.generation == generation)
            {
                slots.remove(&token);
            }
        }

        info!(
            trigger_at = intent.fired.trigger_at_millis,
            snooze = intent.fired.is_snooze,
            "alarm timer fired"
        );
        if tx.send(intent).await.is_err() {
            warn!("alarm fired but no receiver is listening");
        }
    }
}

impl ExactTimerPort for TokioTimerPort {
    async fn schedule_exact_at(
        &self,
        trigger_at_millis: i64,
        pending: PendingAlarm,
        use_alarm_clock_ui: bool,
    ) -> Result<(), TimerError> {
        if self.intent_tx.is_closed() {
            return Err(TimerError::Unavailable(
                "alarm intent receiver was dropped".to_string(),
            ));
        }

        let delay_millis = trigger_at_millis.saturating_sub(self.clock.now_millis()).max(0);
        let deadline = Instant::now() + Duration::from_millis(delay_millis as u64);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = pending.token.clone();

        // hold the table while spawning so an immediate fire sees its own entry
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| TimerError::Rejected("timer table poisoned".to_string()))?;
        let handle = tokio::spawn(Self::fire(
            Arc::clone(&self.slots),
            token.clone(),
            generation,
            deadline,
            pending.intent,
            self.intent_tx.clone(),
        ));
        if let Some(previous) = slots.insert(
            token,
            ArmedTimer {
                generation,
                trigger_at_millis,
                handle,
            },
        ) {
            previous.handle.abort();
            debug!(
                previous = previous.trigger_at_millis,
                "replaced armed alarm timer"
            );
        }

        debug!(
            trigger_at = trigger_at_millis,
            delay_ms = delay_millis,
            alarm_clock_ui = use_alarm_clock_ui,
            "alarm timer armed"
        );
        Ok(())
    }

    async fn cancel(&self, token: &TimerToken) {
        let removed = self
            .slots
            .lock()
            .ok()
            .and_then(|mut slots| slots.remove(token));
        if let Some(armed) = removed {
            armed.handle.abort();
            debug!(trigger_at = armed.trigger_at_millis, "alarm timer cancelled");
        }
    }

    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed.load(Ordering::SeqCst)
    }

    fn pending_trigger(&self, token: &TimerToken) -> Option<i64> {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(token).map(|armed| armed.trigger_at_millis))
    }
}

impl Drop for TokioTimerPort {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.slots.lock() {
            for (_, armed) in slots.drain() {
                armed.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::AlarmRecord;

    const NOW: i64 = 1_767_250_000_000;

    fn port(capacity: usize) -> (TokioTimerPort, mpsc::Receiver<AlarmIntent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (TokioTimerPort::new(tx, Arc::new(ManualClock::new(NOW))), rx)
    }

    fn pending(trigger_at_millis: i64, label: &str) -> PendingAlarm {
        PendingAlarm::for_record(&AlarmRecord::new(trigger_at_millis, Some(label.into()), false))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (port, mut rx) = port(4);
        let start = Instant::now();

        port.schedule_exact_at(NOW + 60_000, pending(NOW + 60_000, "a"), true)
            .await
            .unwrap();
        assert_eq!(port.pending_trigger(&TimerToken::alarm()), Some(NOW + 60_000));

        let intent = rx.recv().await.unwrap();
        assert_eq!(intent.fired.label.as_deref(), Some("a"));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(port.pending_trigger(&TimerToken::alarm()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_on_same_token_replaces_timer() {
        let (port, mut rx) = port(4);

        port.schedule_exact_at(NOW + 1_000, pending(NOW + 1_000, "first"), true)
            .await
            .unwrap();
        port.schedule_exact_at(NOW + 5_000, pending(NOW + 5_000, "second"), true)
            .await
            .unwrap();
        assert_eq!(port.armed_count(), 1);

        let intent = rx.recv().await.unwrap();
        assert_eq!(intent.fired.label.as_deref(), Some("second"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_delivery() {
        let (port, mut rx) = port(4);
        port.schedule_exact_at(NOW + 1_000, pending(NOW + 1_000, "a"), false)
            .await
            .unwrap();

        port.cancel(&TimerToken::alarm()).await;
        port.cancel(&TimerToken::alarm()).await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(port.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn past_trigger_fires_immediately() {
        let (port, mut rx) = port(4);
        port.schedule_exact_at(NOW - 5_000, pending(NOW - 5_000, "late"), true)
            .await
            .unwrap();

        let intent = rx.recv().await.unwrap();
        assert_eq!(intent.fired.label.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn closed_receiver_is_unavailable() {
        let (port, rx) = port(1);
        drop(rx);

        let result = port
            .schedule_exact_at(NOW + 1_000, pending(NOW + 1_000, "a"), true)
            .await;
        assert!(matches!(result, Err(TimerError::Unavailable(_))));
        assert_eq!(port.armed_count(), 0);
    }

    #[test]
    fn permission_can_be_revoked() {
        let (tx, _rx) = mpsc::channel(1);
        let port = TokioTimerPort::new(tx, Arc::new(ManualClock::new(NOW)));
        assert!(port.can_schedule_exact());

        port.set_exact_allowed(false);
        assert!(!port.can_schedule_exact());
    }
}
