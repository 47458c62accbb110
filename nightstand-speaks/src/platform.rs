//! Platform built-in speech engine.
//!
//! The platform service reports the end of its initialization through a
//! one-shot callback. [`PlatformEngine`] bridges that callback into a
//! `oneshot` channel awaited inside a [`OnceCell`], so every concurrent or
//! later `initialize` call awaits the same outcome and the service is only
//! ever connected once. The wait is bounded by
//! [`SpeechConfig::init_timeout`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{OnceCell, oneshot};
use tracing::{debug, error, info, warn};

use crate::errors::SpeechError;
use crate::traits::{PlatformSpeech, SpeechEngine};
use crate::types::{BackendKind, DEFAULT_LOCALE, InitStatus, QueueMode, SpeechConfig, UtteranceParams};

/// Resolved result of connecting to the platform service.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InitOutcome {
    Ready,
    Failed(String),
    TimedOut,
}

/// Speech engine backed by the platform's built-in service.
pub struct PlatformEngine {
    config: SpeechConfig,
    backend: Arc<dyn PlatformSpeech>,
    init: OnceCell<InitOutcome>,
    released: AtomicBool,
    utterance_seq: AtomicU64,
}

impl PlatformEngine {
    /// Engine name constant for logs and error messages.
    pub const NAME: &'static str = "platform";

    pub fn new(config: SpeechConfig, backend: Arc<dyn PlatformSpeech>) -> Self {
        Self {
            config,
            backend,
            init: OnceCell::new(),
            released: AtomicBool::new(false),
            utterance_seq: AtomicU64::new(0),
        }
    }

    fn is_ready(&self) -> bool {
        !self.released.load(Ordering::SeqCst) && self.init.get() == Some(&InitOutcome::Ready)
    }

    async fn connect(&self) -> InitOutcome {
        info!("Connecting to platform speech service");
        let (tx, rx) = oneshot::channel();
        self.backend.connect(Box::new(move |status: InitStatus| {
            let _ = tx.send(status);
        }));

        match tokio::time::timeout(self.config.init_timeout, rx).await {
            Ok(Ok(InitStatus::Success)) => {
                self.apply_locale();
                info!("Platform speech service ready");
                InitOutcome::Ready
            }
            Ok(Ok(InitStatus::Error(message))) => {
                error!(%message, "platform speech initialization failed");
                InitOutcome::Failed(message)
            }
            Ok(Err(_)) => {
                error!("platform speech service dropped its init callback");
                InitOutcome::Failed("init callback dropped without a status".into())
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.init_timeout.as_millis() as u64,
                    "platform speech service never finished initializing"
                );
                InitOutcome::TimedOut
            }
        }
    }

    /// Requested locale, or the default one when the platform lacks it.
    fn apply_locale(&self) {
        let requested = self.config.locale.as_str();
        let availability = self.backend.set_language(requested);
        if !availability.is_available() {
            warn!(
                locale = requested,
                ?availability,
                "requested locale unavailable, falling back to {DEFAULT_LOCALE}"
            );
            self.backend.set_language(DEFAULT_LOCALE);
        }
    }
}

impl SpeechEngine for PlatformEngine {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::PlatformFallback
    }

    async fn initialize(&self) -> Result<(), SpeechError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(SpeechError::InitFailed {
                engine: Self::NAME,
                message: "engine already released".into(),
            });
        }

        match self.init.get_or_init(|| self.connect()).await {
            InitOutcome::Ready => Ok(()),
            InitOutcome::Failed(message) => Err(SpeechError::InitFailed {
                engine: Self::NAME,
                message: message.clone(),
            }),
            InitOutcome::TimedOut => Err(SpeechError::InitTimeout {
                engine: Self::NAME,
                timeout: self.config.init_timeout,
            }),
        }
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        if !self.is_ready() {
            return Err(SpeechError::NotInitialized { engine: Self::NAME });
        }

        let seq = self.utterance_seq.fetch_add(1, Ordering::Relaxed);
        let params = UtteranceParams {
            utterance_id: format!("utterance-{seq}"),
            volume: self.config.volume.value(),
        };
        debug!(utterance = %params.utterance_id, "platform utterance queued");

        // only the most recent utterance should ever be audible
        self.backend.speak(text, QueueMode::Flush, &params)
    }

    async fn stop(&self) {
        if !self.released.load(Ordering::SeqCst) {
            self.backend.stop();
        }
    }

    async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.backend.stop();
        self.backend.shutdown();
        info!("Platform speech engine released");
    }
}

// ============================================================================
// Tests
// ============================================================================
