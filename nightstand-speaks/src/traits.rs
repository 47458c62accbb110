//! Traits for the nightstand speech layer.
//!
//! [`SpeechEngine`] is the four-method capability set every backend
//! implements. The remaining traits are the seams each backend talks to:
//! the offline engine needs a [`ModelLoader`] and an [`AudioSink`], the
//! platform engine needs a [`PlatformSpeech`].

use crate::errors::SpeechError;
use crate::types::{
    BackendKind, GeneratedAudio, InitStatus, LanguageAvailability, PcmFormat, QueueMode,
    UtteranceParams,
};

/// Capability set shared by both speech backends.
///
/// ## Native Async Traits
///
/// This trait uses native Rust async functions in traits (AFIT), so it is
/// not object safe. The speech manager dispatches over a tagged enum
/// instead of a trait object.
///
/// ## Contract
///
/// - `initialize` is idempotent; calling it on an initialized engine is a no-op.
/// - `speak` fails with [`SpeechError::NotInitialized`] before a successful
///   `initialize`; blank text (after trimming) is a silent no-op.
/// - `stop` and `release` are idempotent and always safe.
pub trait SpeechEngine: Send + Sync {
    /// Human-readable engine name for logs and errors.
    fn name(&self) -> &'static str;

    /// Which backend kind this engine reports to the manager.
    fn kind(&self) -> BackendKind;

    fn initialize(&self) -> impl std::future::Future<Output = Result<(), SpeechError>> + Send;

    fn speak(&self, text: &str) -> impl std::future::Future<Output = Result<(), SpeechError>> + Send;

    fn stop(&self) -> impl std::future::Future<Output = ()> + Send;

    fn release(&self) -> impl std::future::Future<Output = ()> + Send;
}

// ============================================================================
// Offline engine seams
// ============================================================================

/// A loaded neural model that turns text into PCM audio.
///
/// Generation is CPU bound and synchronous; the offline engine runs it on
/// the blocking pool.
pub trait Synthesizer: Send + Sync {
    fn generate(&self, text: &str) -> Result<GeneratedAudio, SpeechError>;
}

/// Constructs the [`Synthesizer`] for the offline engine.
///
/// Called at most once per engine instance, on the blocking pool.
/// Returns [`SpeechError::UnsupportedOperation`] when the model cannot be
/// used in this deployment.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn Synthesizer>, SpeechError>;
}

/// A fully-buffered (static transfer mode) output track.
pub trait AudioTrack: Send {
    /// Write samples into the track's buffer, returning how many were accepted.
    fn write(&mut self, samples: &[f32]) -> Result<usize, SpeechError>;

    fn play(&mut self) -> Result<(), SpeechError>;

    fn is_playing(&self) -> bool;

    fn stop(&mut self);

    fn flush(&mut self);

    /// Free the underlying output resources. Called exactly once per track.
    fn release(&mut self);
}

/// Factory for [`AudioTrack`]s on the device's audio output.
///
/// Opening a track may wait on the device, so the offline engine calls
/// `open_static` on the blocking pool.
pub trait AudioSink: Send + Sync {
    /// Open a static track able to hold `len` samples in `format`.
    fn open_static(&self, format: PcmFormat, len: usize) -> Result<Box<dyn AudioTrack>, SpeechError>;
}

// ============================================================================
// Platform engine seam
// ============================================================================

/// One-shot completion callback for [`PlatformSpeech::connect`].
pub type InitCallback = Box<dyn FnOnce(InitStatus) + Send + 'static>;

/// The platform's built-in speech service.
///
/// Mirrors how such services are exposed by operating systems: construction
/// completes asynchronously by invoking a callback exactly once (or, on a
/// misbehaving platform, never).
///
/// Every method is called from async code on a runtime worker and must not
/// block. Slow work belongs in `connect`, which reports back through the
/// callback; `speak` hands the utterance off and returns.
pub trait PlatformSpeech: Send + Sync {
    /// Start connecting to the service; `on_ready` reports the outcome.
    fn connect(&self, on_ready: InitCallback);

    fn set_language(&self, locale: &str) -> LanguageAvailability;

    fn speak(&self, text: &str, mode: QueueMode, params: &UtteranceParams) -> Result<(), SpeechError>;

    fn stop(&self);

    /// Disconnect from the service and free its resources.
    fn shutdown(&self);
}

// ============================================================================
// Tests
// ============================================================================
