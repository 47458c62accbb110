//! Offline neural speech engine.
//!
//! Text is synthesized into one complete PCM buffer, then written to a static
//! audio track and played. The model is constructed lazily, exactly once per
//! engine instance. Playback is serialized: starting an utterance releases the
//! one still playing.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::SpeechError;
use crate::traits::{AudioSink, AudioTrack, ModelLoader, SpeechEngine, Synthesizer};
use crate::types::{BackendKind, GeneratedAudio, SpeechConfig};

/// File name of the acoustic model inside a bundled model directory.
pub const MODEL_FILE: &str = "model.onnx";

/// Token table of the acoustic model.
pub const TOKENS_FILE: &str = "tokens.txt";

/// Phonemizer data directory inside a bundled model directory.
pub const PHONEME_DATA_DIR: &str = "espeak-ng-data";

// ============================================================================
// Model assets
// ============================================================================

/// Paths of a bundled offline voice model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAssets {
    pub model_dir: PathBuf,
    pub model: PathBuf,
    pub tokens: PathBuf,
    pub phoneme_data: PathBuf,
}

impl ModelAssets {
    /// Validate that `dir` holds a complete model bundle.
    ///
    /// ## Errors
    ///
    /// Returns [`SpeechError::UnsupportedOperation`] naming the first missing
    /// piece, since a missing model only means the offline engine cannot be
    /// used in this deployment.
    pub fn locate(dir: impl AsRef<Path>) -> Result<Self, SpeechError> {
        let model_dir = dir.as_ref().to_path_buf();
        if !model_dir.is_dir() {
            return Err(SpeechError::unsupported(format!(
                "offline model directory {} does not exist",
                model_dir.display()
            )));
        }

        let model = model_dir.join(MODEL_FILE);
        if !model.is_file() {
            return Err(SpeechError::unsupported(format!(
                "offline model {} is not bundled",
                model.display()
            )));
        }

        let tokens = model_dir.join(TOKENS_FILE);
        if !tokens.is_file() {
            return Err(SpeechError::unsupported(format!(
                "model tokens {} are not bundled",
                tokens.display()
            )));
        }

        let phoneme_data = model_dir.join(PHONEME_DATA_DIR);
        if !phoneme_data.is_dir() {
            return Err(SpeechError::unsupported(format!(
                "phoneme data {} is not bundled",
                phoneme_data.display()
            )));
        }

        Ok(Self {
            model_dir,
            model,
            tokens,
            phoneme_data,
        })
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The track currently owned by the engine, tagged with a generation id so
/// a finished utterance only releases its own track.
struct ActiveTrack {
    id: u64,
    track: Box<dyn AudioTrack>,
}

/// Offline neural speech engine.
///
/// ## Examples
///
/// ```ignore
/// use std::sync::Arc;
/// use nightstand_speaks::{OfflineEngine, SpeechConfig, SpeechEngine};
///
/// let engine = OfflineEngine::new(SpeechConfig::default(), Arc::new(my_loader), Some(Arc::new(my_sink)));
/// engine.initialize().await?;
/// engine.speak("Good morning").await?;
/// ```
pub struct OfflineEngine {
    config: SpeechConfig,
    loader: Arc<dyn ModelLoader>,
    sink: Option<Arc<dyn AudioSink>>,
    model: Mutex<Option<Arc<dyn Synthesizer>>>,
    playback: Mutex<Option<ActiveTrack>>,
    next_track_id: AtomicU64,
}

impl OfflineEngine {
    /// Engine name constant for logs and error messages.
    pub const NAME: &'static str = "offline";

    pub fn new(
        config: SpeechConfig,
        loader: Arc<dyn ModelLoader>,
        sink: Option<Arc<dyn AudioSink>>,
    ) -> Self {
        Self {
            config,
            loader,
            sink,
            model: Mutex::new(None),
            playback: Mutex::new(None),
            next_track_id: AtomicU64::new(1),
        }
    }

    /// Construct the synthesizer if it is not there yet.
    ///
    /// The check and the construction happen under one lock so concurrent
    /// callers converge on a single load.
    async fn ensure_model(&self) -> Result<Arc<dyn Synthesizer>, SpeechError> {
        let mut model = self.model.lock().await;
        if let Some(existing) = model.as_ref() {
            return Ok(Arc::clone(existing));
        }

        if self.sink.is_none() {
            return Err(SpeechError::unsupported("no audio output configured"));
        }

        info!("Initializing offline speech engine");
        let loader = Arc::clone(&self.loader);
        let loaded: Arc<dyn Synthesizer> =
            Arc::from(tokio::task::spawn_blocking(move || loader.load()).await??);
        *model = Some(Arc::clone(&loaded));
        info!("Offline speech engine ready");

        Ok(loaded)
    }

    async fn play(&self, audio: GeneratedAudio) -> Result<(), SpeechError> {
        let sink = self
            .sink
            .clone()
            .ok_or_else(|| SpeechError::unsupported("no audio output configured"))?;
        let id = self.next_track_id.fetch_add(1, Ordering::Relaxed);

        let wait = {
            let mut current = self.playback.lock().await;
            release_track(current.take());

            // opening an output device may block until the device answers
            let (format, len) = (audio.format(), audio.samples.len());
            let mut track =
                tokio::task::spawn_blocking(move || sink.open_static(format, len)).await??;
            let written = match track.write(&audio.samples) {
                Ok(written) => written,
                Err(err) => {
                    track.release();
                    return Err(err);
                }
            };
            if written == 0 {
                track.release();
                return Err(SpeechError::playback(
                    "failed to buffer audio for playback (0 samples written)",
                ));
            }
            if let Err(err) = track.play() {
                track.release();
                return Err(err);
            }

            *current = Some(ActiveTrack { id, track });
            Duration::from_secs_f64(audio.duration_ms() / 1000.0) + self.config.playback_margin
        };

        debug!(track = id, wait_ms = wait.as_millis() as u64, "offline utterance playing");
        tokio::time::sleep(wait).await;

        let mut current = self.playback.lock().await;
        if current.as_ref().is_some_and(|active| active.id == id) {
            release_track(current.take());
        } else {
            debug!(track = id, "utterance superseded, leaving newer track alone");
        }

        Ok(())
    }

    async fn stop_playback(&self) {
        let mut current = self.playback.lock().await;
        release_track(current.take());
    }
}

fn release_track(active: Option<ActiveTrack>) {
    if let Some(mut active) = active {
        if active.track.is_playing() {
            active.track.stop();
        }
        active.track.flush();
        active.track.release();
    }
}

impl SpeechEngine for OfflineEngine {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::PreferredOffline
    }

    async fn initialize(&self) -> Result<(), SpeechError> {
        self.ensure_model().await.map(|_| ())
    }

    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let synthesizer = self
            .model
            .lock()
            .await
            .clone()
            .ok_or(SpeechError::NotInitialized { engine: Self::NAME })?;

        // stop any active playback before generating a new utterance
        self.stop_playback().await;

        let owned = text.to_string();
        let audio = tokio::task::spawn_blocking(move || synthesizer.generate(&owned)).await??;

        self.play(audio).await
    }

    async fn stop(&self) {
        self.stop_playback().await;
    }

    async fn release(&self) {
        self.stop_playback().await;
        if self.model.lock().await.take().is_some() {
            info!("Offline speech engine released");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
