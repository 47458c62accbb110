//! Nightstand Speaks
//!
//! Text-to-speech for the nightstand alarm: an offline neural engine that is
//! preferred when its model is bundled, and the platform's built-in speech
//! service as the fallback.
//!
//! ## Features
//!
//! - **Single live engine**: [`SpeechManager`] owns at most one engine and
//!   builds it lazily on the first utterance
//! - **Automatic fallback**: `Auto` tries the offline engine once, then the
//!   platform engine
//! - **Preference changes**: switching to a preference that excludes the live
//!   engine tears it down
//! - **Async-first**: built on tokio; blocking model work runs on the blocking pool
//!
//! ## Quick Start
//!
//! ```ignore
//! use nightstand_speaks::{BackendPreference, EngineFactory, SpeechConfig, SpeechManager};
//!
//! let factory = EngineFactory::host(SpeechConfig::default(), None);
//! let manager = SpeechManager::new(factory, BackendPreference::Auto);
//! manager.speak("Your to-do list is empty.").await?;
//! ```
//!
//! ## Module Structure
//!
//! - [`types`] - Backend kinds, preferences, audio buffers and config
//! - [`errors`] - Error types for speech operations
//! - [`traits`] - The `SpeechEngine` trait and the model, audio and platform seams
//! - [`offline`] - The offline neural engine
//! - [`platform`] - The platform built-in engine
//! - [`providers`] - Host implementations of the seams
//! - [`manager`] - Backend selection, fallback and lifecycle

pub mod errors;
pub mod manager;
pub mod offline;
pub mod platform;
pub mod providers;
pub mod traits;
pub mod types;

#[cfg(test)]
mod test_support;

pub use errors::SpeechError;
pub use manager::{EngineFactory, LiveEngine, PlatformConnector, SpeechManager};
pub use offline::{ModelAssets, OfflineEngine};
pub use platform::PlatformEngine;
pub use providers::{HostProgram, HostSpeech, SherpaLoader};
#[cfg(feature = "rodio")]
pub use providers::RodioSink;
pub use traits::{
    AudioSink, AudioTrack, InitCallback, ModelLoader, PlatformSpeech, SpeechEngine, Synthesizer,
};
pub use types::{
    BackendKind, BackendPreference, DEFAULT_LOCALE, GeneratedAudio, InitStatus,
    LanguageAvailability, PcmFormat, QueueMode, SpeechConfig, UtteranceParams, VolumeLevel,
};
