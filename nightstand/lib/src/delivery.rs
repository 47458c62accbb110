//! Routing fired alarms to the ringing surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::{ALARM_ACTION, AlarmFired, AlarmIntent, LaunchFlags};

/// Brings the ringing surface to the foreground.
pub trait RingingLauncher: Send + Sync {
    fn launch(&self, fired: AlarmFired, flags: LaunchFlags);
}

/// Receives timer intents and launches the ringing surface for alarm ones.
pub struct AlarmDeliveryHandler {
    launcher: Arc<dyn RingingLauncher>,
}

impl AlarmDeliveryHandler {
    pub fn new(launcher: Arc<dyn RingingLauncher>) -> Self {
        Self { launcher }
    }

    /// Handles one delivered intent. Returns whether the surface was launched.
    pub fn on_receive(&self, intent: &AlarmIntent) -> bool {
        if intent.action != ALARM_ACTION {
            warn!(action = %intent.action, "ignoring intent with unexpected action");
            return false;
        }

        info!(
            trigger_at = intent.fired.trigger_at_millis,
            snooze = intent.fired.is_snooze,
            "alarm delivered, launching ringing surface"
        );
        self.launcher.launch(intent.fired.clone(), LaunchFlags::ALARM);
        true
    }
}

/// Drains `intents` on a tokio task, handing each to `handler`.
///
/// The task ends when every sender (the timer port) is dropped.
pub fn spawn_delivery_loop(
    mut intents: mpsc::Receiver<AlarmIntent>,
    handler: Arc<AlarmDeliveryHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(intent) = intents.recv().await {
            handler.on_receive(&intent);
        }
        debug!("alarm delivery loop finished");
    })
}

/// A single ringing surface slot.
///
/// Launches publish the payload on a `watch` channel, so a launch while the
/// surface is already showing replaces what it shows instead of opening a
/// second one.
pub struct RingingHost {
    current: watch::Sender<Option<AlarmFired>>,
    launches: AtomicUsize,
}

impl Default for RingingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RingingHost {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            launches: AtomicUsize::new(0),
        }
    }

    /// Observe launches.
    pub fn subscribe(&self) -> watch::Receiver<Option<AlarmFired>> {
        self.current.subscribe()
    }

    /// The payload most recently launched.
    pub fn current(&self) -> Option<AlarmFired> {
        self.current.borrow().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl RingingLauncher for RingingHost {
    fn launch(&self, fired: AlarmFired, flags: LaunchFlags) {
        let reused = self.current.borrow().is_some() && flags.contains(LaunchFlags::SINGLE_TOP);
        self.launches.fetch_add(1, Ordering::SeqCst);
        debug!(reused, "ringing surface launched");
        self.current.send_replace(Some(fired));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recorder {
        launched: Mutex<Vec<(AlarmFired, LaunchFlags)>>,
    }

    impl RingingLauncher for Recorder {
        fn launch(&self, fired: AlarmFired, flags: LaunchFlags) {
            self.launched.lock().unwrap().push((fired, flags));
        }
    }

    fn intent(action: &str, label: &str) -> AlarmIntent {
        AlarmIntent {
            action: action.to_string(),
            fired: AlarmFired {
                trigger_at_millis: 1_000,
                label: Some(label.to_string()),
                is_snooze: false,
            },
        }
    }

    #[test]
    fn alarm_intent_launches_with_alarm_flags() {
        let recorder = Arc::new(Recorder::default());
        let handler = AlarmDeliveryHandler::new(recorder.clone());

        assert!(handler.on_receive(&intent(ALARM_ACTION, "Wake up")));

        let launched = recorder.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].0.label.as_deref(), Some("Wake up"));
        assert_eq!(launched[0].1, LaunchFlags::ALARM);
    }

    #[traced_test]
    #[test]
    fn foreign_action_is_ignored_and_logged() {
        let recorder = Arc::new(Recorder::default());
        let handler = AlarmDeliveryHandler::new(recorder.clone());

        assert!(!handler.on_receive(&intent("com.example.OTHER", "x")));
        assert!(recorder.launched.lock().unwrap().is_empty());
        assert!(logs_contain("ignoring intent with unexpected action"));
    }

    #[test]
    fn host_replaces_payload_on_relaunch() {
        let host = RingingHost::new();
        let rx = host.subscribe();

        host.launch(intent(ALARM_ACTION, "first").fired, LaunchFlags::ALARM);
        host.launch(intent(ALARM_ACTION, "second").fired, LaunchFlags::ALARM);

        assert_eq!(host.launch_count(), 2);
        assert_eq!(
            rx.borrow().as_ref().and_then(|f| f.label.clone()).as_deref(),
            Some("second")
        );
        assert_eq!(host.current().unwrap().label.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn delivery_loop_forwards_until_senders_drop() {
        let host = Arc::new(RingingHost::new());
        let handler = Arc::new(AlarmDeliveryHandler::new(host.clone()));
        let (tx, rx) = mpsc::channel(4);
        let task = spawn_delivery_loop(rx, handler);

        tx.send(intent(ALARM_ACTION, "a")).await.unwrap();
        tx.send(intent("other", "b")).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(host.launch_count(), 1);
        assert_eq!(host.current().unwrap().label.as_deref(), Some("a"));
    }
}
