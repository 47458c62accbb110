//! Wiring: one process-wide set of components built from configuration.

use std::sync::Arc;

use nightstand_speaks::{EngineFactory, SpeechManager};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::NightstandConfig;
use crate::delivery::{AlarmDeliveryHandler, RingingHost, spawn_delivery_loop};
use crate::error::AlarmError;
use crate::ringing::RingingSurface;
use crate::scheduler::{AlarmScheduler, Reconciliation};
use crate::snooze::SnoozeCoordinator;
use crate::store::JsonFileStore;
use crate::timer::TokioTimerPort;

/// Capacity of the fired-alarm channel.
const INTENT_BUFFER: usize = 16;

pub type FileScheduler = AlarmScheduler<JsonFileStore, TokioTimerPort>;

/// The running application: alarm slot, ringing surface and speech.
pub struct Nightstand {
    pub scheduler: Arc<FileScheduler>,
    pub snooze: Arc<SnoozeCoordinator<JsonFileStore, TokioTimerPort>>,
    pub ringing: Arc<RingingSurface<JsonFileStore, TokioTimerPort>>,
    pub host: Arc<RingingHost>,
    pub speech: Arc<SpeechManager>,
    tasks: Vec<JoinHandle<()>>,
}

impl Nightstand {
    /// Starts with the system clock and the host speech backends.
    ///
    /// ## Errors
    ///
    /// Returns [`AlarmError::Config`] for an invalid configuration, or the
    /// startup reconciliation error.
    pub async fn start(config: &NightstandConfig) -> Result<(Self, Reconciliation), AlarmError> {
        let factory = EngineFactory::host(
            config.speech.speech_config(),
            config.speech.model_dir.clone(),
        );
        Self::start_with(config, Arc::new(SystemClock), factory).await
    }

    /// Builds every component, starts the delivery loop and reconciles the
    /// persisted alarm with the (fresh) timer.
    ///
    /// ## Errors
    ///
    /// Returns [`AlarmError::Config`] before anything is built if the
    /// configuration does not validate, or the startup reconciliation error.
    pub async fn start_with(
        config: &NightstandConfig,
        clock: Arc<dyn Clock>,
        factory: EngineFactory,
    ) -> Result<(Self, Reconciliation), AlarmError> {
        config.validate()?;

        let (intent_tx, intent_rx) = mpsc::channel(INTENT_BUFFER);
        let store = JsonFileStore::new(config.resolved_store_path());
        let timer = TokioTimerPort::new(intent_tx, Arc::clone(&clock));

        let scheduler = Arc::new(AlarmScheduler::new(
            store,
            timer,
            clock,
            config.scheduler_options(),
        ));
        let snooze = Arc::new(
            SnoozeCoordinator::new(Arc::clone(&scheduler)).with_interval(config.snooze_interval())?,
        );
        let ringing = Arc::new(RingingSurface::new(Arc::clone(&scheduler), Arc::clone(&snooze)));
        let host = Arc::new(RingingHost::new());
        let speech = Arc::new(SpeechManager::new(factory, config.speech.preference));

        let handler = Arc::new(AlarmDeliveryHandler::new(host.clone()));
        let tasks = vec![
            spawn_delivery_loop(intent_rx, handler),
            ringing.follow(host.subscribe()),
        ];

        let app = Self {
            scheduler,
            snooze,
            ringing,
            host,
            speech,
            tasks,
        };

        let outcome = app.scheduler.reconcile().await?;
        info!(
            store = %config.resolved_store_path().display(),
            preference = %config.speech.preference,
            "nightstand started"
        );
        Ok((app, outcome))
    }

    /// Releases the speech engine and stops background tasks.
    pub async fn shutdown(self) {
        self.speech.close().await;
    }
}

impl Drop for Nightstand {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
