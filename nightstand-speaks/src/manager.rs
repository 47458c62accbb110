//! Speech manager: owns at most one live engine and the backend preference.
//!
//! Backend selection and fallback live here and nowhere else. Engine
//! construction, teardown and preference changes are serialized by one
//! mutex; the utterance itself plays outside that mutex so `stop` can cut
//! it short.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use crate::errors::SpeechError;
use crate::offline::OfflineEngine;
use crate::platform::PlatformEngine;
use crate::providers::{HostSpeech, SherpaLoader};
use crate::traits::{AudioSink, ModelLoader, PlatformSpeech, SpeechEngine};
use crate::types::{BackendKind, BackendPreference, SpeechConfig};

/// Produces a fresh platform service connection for each platform engine.
pub type PlatformConnector = Arc<dyn Fn() -> Arc<dyn PlatformSpeech> + Send + Sync>;

// ============================================================================
// Engine factory
// ============================================================================

/// Builds new engine instances on demand.
#[derive(Clone)]
pub struct EngineFactory {
    config: SpeechConfig,
    loader: Arc<dyn ModelLoader>,
    sink: Option<Arc<dyn AudioSink>>,
    platform: PlatformConnector,
}

impl EngineFactory {
    pub fn new(
        config: SpeechConfig,
        loader: Arc<dyn ModelLoader>,
        sink: Option<Arc<dyn AudioSink>>,
        platform: PlatformConnector,
    ) -> Self {
        Self {
            config,
            loader,
            sink,
            platform,
        }
    }

    /// Factory for a desktop host: the host speech CLI as the platform
    /// engine, and the bundled model in `model_dir` run by the sherpa-onnx
    /// runtime as the offline engine.
    ///
    /// With the `rodio` feature the offline engine gets the default output
    /// device; without it the offline engine is unsupported.
    pub fn host(config: SpeechConfig, model_dir: Option<PathBuf>) -> Self {
        #[cfg(feature = "rodio")]
        let sink: Option<Arc<dyn AudioSink>> = Some(Arc::new(crate::providers::RodioSink::new()));
        #[cfg(not(feature = "rodio"))]
        let sink: Option<Arc<dyn AudioSink>> = None;

        Self::new(
            config,
            Arc::new(SherpaLoader::new(model_dir)),
            sink,
            Arc::new(|| Arc::new(HostSpeech::new()) as Arc<dyn PlatformSpeech>),
        )
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    pub fn offline(&self) -> OfflineEngine {
        OfflineEngine::new(self.config.clone(), Arc::clone(&self.loader), self.sink.clone())
    }

    pub fn platform(&self) -> PlatformEngine {
        PlatformEngine::new(self.config.clone(), (self.platform)())
    }
}

// ============================================================================
// Live engine
// ============================================================================

/// The one engine the manager keeps alive.
pub enum LiveEngine {
    Offline(OfflineEngine),
    Platform(PlatformEngine),
}

impl SpeechEngine for LiveEngine {
    fn name(&self) -> &'static str {
        match self {
            LiveEngine::Offline(engine) => engine.name(),
            LiveEngine::Platform(engine) => engine.name(),
        }
    }

    fn kind(&self) -> BackendKind {
        match self {
            LiveEngine::Offline(engine) => engine.kind(),
            LiveEngine::Platform(engine) => engine.kind(),
        }
    }

    async fn initialize(&self) -> Result<(), SpeechError> {
        match self {
            LiveEngine::Offline(engine) => engine.initialize().await,
            LiveEngine::Platform(engine) => engine.initialize().await,
        }
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        match self {
            LiveEngine::Offline(engine) => engine.speak(text).await,
            LiveEngine::Platform(engine) => engine.speak(text).await,
        }
    }

    async fn stop(&self) {
        match self {
            LiveEngine::Offline(engine) => engine.stop().await,
            LiveEngine::Platform(engine) => engine.stop().await,
        }
    }

    async fn release(&self) {
        match self {
            LiveEngine::Offline(engine) => engine.release().await,
            LiveEngine::Platform(engine) => engine.release().await,
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

struct ManagerState {
    engine: Option<Arc<LiveEngine>>,
    preference: BackendPreference,
}

/// Owns zero or one live speech engine.
///
/// ## Examples
///
/// ```ignore
/// use nightstand_speaks::{BackendPreference, EngineFactory, SpeechConfig, SpeechManager};
///
/// let manager = SpeechManager::new(EngineFactory::host(SpeechConfig::default(), None), BackendPreference::Auto);
/// manager.speak("You have two to-do items.").await?;
/// manager.close().await;
/// ```
pub struct SpeechManager {
    factory: EngineFactory,
    state: Mutex<ManagerState>,
    active: watch::Sender<BackendKind>,
}

impl SpeechManager {
    pub fn new(factory: EngineFactory, preference: BackendPreference) -> Self {
        let (active, _) = watch::channel(BackendKind::None);
        Self {
            factory,
            state: Mutex::new(ManagerState {
                engine: None,
                preference,
            }),
            active,
        }
    }

    /// Which backend is live right now.
    pub fn active_backend(&self) -> BackendKind {
        *self.active.borrow()
    }

    /// Observe backend changes (for the UI indicator).
    pub fn subscribe(&self) -> watch::Receiver<BackendKind> {
        self.active.subscribe()
    }

    pub async fn preference(&self) -> BackendPreference {
        self.state.lock().await.preference
    }

    /// Speak `text` on the live engine, resolving one first if needed.
    ///
    /// ## Errors
    ///
    /// Returns the resolution error when no allowed backend initializes, or
    /// the engine's error for this utterance.
    pub async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let engine = self.ensure_engine().await?;
        engine.speak(text).await
    }

    /// Stop whatever the live engine is saying. No-op without an engine.
    pub async fn stop(&self) {
        let state = self.state.lock().await;
        if let Some(engine) = state.engine.as_ref() {
            engine.stop().await;
        }
    }

    /// Record a new preference, tearing down a live engine it no longer allows.
    ///
    /// The next `speak` resolves an engine again. `Auto` never forces a reset.
    pub async fn update_preference(&self, preference: BackendPreference) {
        let mut state = self.state.lock().await;
        state.preference = preference;

        let incompatible = state
            .engine
            .as_ref()
            .is_some_and(|engine| !preference.accepts(engine.kind()));
        if incompatible {
            if let Some(engine) = state.engine.take() {
                info!(engine = engine.name(), %preference, "preference changed, releasing engine");
                engine.release().await;
            }
            self.active.send_replace(BackendKind::None);
        }
    }

    /// Release the live engine. Safe to call repeatedly.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(engine) = state.engine.take() {
            engine.release().await;
        }
        self.active.send_replace(BackendKind::None);
    }

    async fn ensure_engine(&self) -> Result<Arc<LiveEngine>, SpeechError> {
        let mut state = self.state.lock().await;
        if let Some(engine) = state.engine.as_ref() {
            return Ok(Arc::clone(engine));
        }

        let engine = match state.preference {
            BackendPreference::PreferredOnly => {
                Self::start(LiveEngine::Offline(self.factory.offline())).await?
            }
            BackendPreference::FallbackOnly => {
                Self::start(LiveEngine::Platform(self.factory.platform())).await?
            }
            BackendPreference::Auto => {
                match Self::start(LiveEngine::Offline(self.factory.offline())).await {
                    Ok(engine) => engine,
                    Err(err) => {
                        warn!(error = %err, "offline engine unavailable, falling back to platform engine");
                        Self::start(LiveEngine::Platform(self.factory.platform())).await?
                    }
                }
            }
        };

        info!(engine = engine.name(), "speech engine resolved");
        let engine = Arc::new(engine);
        state.engine = Some(Arc::clone(&engine));
        self.active.send_replace(engine.kind());
        Ok(engine)
    }

    /// Initialize `engine`, releasing it if initialization fails.
    async fn start(engine: LiveEngine) -> Result<LiveEngine, SpeechError> {
        match engine.initialize().await {
            Ok(()) => Ok(engine),
            Err(err) => {
                engine.release().await;
                Err(err)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
