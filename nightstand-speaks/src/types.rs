//! Core types for the nightstand speech layer.
//!
//! This module defines the fundamental types used throughout the speech system:
//! - Backend kinds and the user's backend preference
//! - Configuration struct with builder pattern
//! - PCM audio and platform-engine handshake types

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Locale the platform engine falls back to when the requested one is unavailable.
pub const DEFAULT_LOCALE: &str = "en-US";

// ============================================================================
// Backend Kind & Preference
// ============================================================================

/// Which backend is currently live inside the speech manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// No engine has been resolved yet (or it was torn down).
    #[default]
    None,
    /// The offline neural engine.
    PreferredOffline,
    /// The platform's built-in engine.
    PlatformFallback,
}

/// The user's backend preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendPreference {
    /// Try the offline engine first, fall back to the platform engine once.
    #[default]
    Auto,
    /// Only ever use the offline engine.
    PreferredOnly,
    /// Only ever use the platform engine.
    FallbackOnly,
}

impl BackendPreference {
    /// Whether a live engine of `kind` may keep running under this preference.
    ///
    /// `Auto` accepts whichever engine is live.
    pub fn accepts(self, kind: BackendKind) -> bool {
        match self {
            BackendPreference::Auto => true,
            BackendPreference::PreferredOnly => kind == BackendKind::PreferredOffline,
            BackendPreference::FallbackOnly => kind == BackendKind::PlatformFallback,
        }
    }
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendPreference::Auto => "auto",
            BackendPreference::PreferredOnly => "preferred-only",
            BackendPreference::FallbackOnly => "fallback-only",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendPreference {
    type Err = String;

    /// Parses the kebab-case names as well as the older `SherpaOnly` /
    /// `AndroidOnly` spellings stored by earlier settings files.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "auto" => Ok(BackendPreference::Auto),
            "preferred-only" | "offline-only" | "sherpaonly" | "sherpa-only" => {
                Ok(BackendPreference::PreferredOnly)
            }
            "fallback-only" | "platform-only" | "androidonly" | "android-only" => {
                Ok(BackendPreference::FallbackOnly)
            }
            _ => Err(format!(
                "unknown speech preference '{value}' (expected auto, preferred-only or fallback-only)"
            )),
        }
    }
}

// ============================================================================
// Volume Level
// ============================================================================

/// Volume level for speech output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum VolumeLevel {
    /// Full volume (1.0)
    #[default]
    Loud,
    /// Reduced volume (0.5)
    Soft,
    /// Explicit volume value (clamped to 0.0-1.0)
    Explicit(f32),
}

impl VolumeLevel {
    /// Get the numeric volume value (0.0 to 1.0).
    pub fn value(&self) -> f32 {
        match self {
            VolumeLevel::Loud => 1.0,
            VolumeLevel::Soft => 0.5,
            VolumeLevel::Explicit(v) => v.clamp(0.0, 1.0),
        }
    }
}

// ============================================================================
// Audio
// ============================================================================

/// A complete utterance produced by the offline synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAudio {
    /// Mono PCM samples in the -1.0..=1.0 range.
    pub samples: Vec<f32>,
    /// Sample rate declared by the model, in Hz.
    pub sample_rate: u32,
}

impl GeneratedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback length in milliseconds (`samples / sample_rate * 1000`).
    ///
    /// ## Examples
    ///
    /// ```
    /// use nightstand_speaks::GeneratedAudio;
    ///
    /// let audio = GeneratedAudio::new(vec![0.0; 22_050], 22_050);
    /// assert_eq!(audio.duration_ms(), 1000.0);
    /// ```
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate) * 1000.0
    }

    /// The format an audio track needs to play these samples.
    pub fn format(&self) -> PcmFormat {
        PcmFormat::mono_f32(self.sample_rate)
    }
}

/// Format of a static PCM track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub fn mono_f32(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }
}

// ============================================================================
// Platform Engine Handshake
// ============================================================================

/// Status handed to the platform engine's initialization callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStatus {
    Success,
    /// The platform reported an error code or message.
    Error(String),
}

/// Result of asking the platform engine for a locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageAvailability {
    /// The language (and country, if given) is available.
    Available,
    /// The language data exists but must be downloaded first.
    MissingData,
    /// The language is not supported at all.
    NotSupported,
}

impl LanguageAvailability {
    pub fn is_available(self) -> bool {
        matches!(self, LanguageAvailability::Available)
    }
}

/// How a new utterance interacts with anything already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Drop everything queued or playing, then speak.
    Flush,
    /// Append after whatever is queued.
    Add,
}

/// Per-utterance parameters passed to the platform engine.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceParams {
    /// Identifier reported back by progress callbacks.
    pub utterance_id: String,
    pub volume: f32,
}

// ============================================================================
// Speech Configuration
// ============================================================================

/// Configuration shared by both engines.
///
/// Use the builder pattern to construct:
///
/// ```
/// use std::time::Duration;
/// use nightstand_speaks::SpeechConfig;
///
/// let config = SpeechConfig::new()
///     .with_locale("en-GB")
///     .with_init_timeout(Duration::from_secs(5));
/// assert_eq!(config.locale, "en-GB");
/// ```
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// BCP-47 locale requested from the platform engine.
    pub locale: String,
    /// Volume used for every utterance.
    pub volume: VolumeLevel,
    /// Upper bound on waiting for the platform engine's init callback.
    pub init_timeout: Duration,
    /// Extra time to keep an offline track alive after its computed duration.
    pub playback_margin: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            volume: VolumeLevel::Loud,
            init_timeout: Duration::from_secs(10),
            playback_margin: Duration::from_millis(120),
        }
    }
}

impl SpeechConfig {
    /// Create a new SpeechConfig with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the requested locale.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Set the output volume.
    #[must_use]
    pub fn with_volume(mut self, volume: VolumeLevel) -> Self {
        self.volume = volume;
        self
    }

    /// Set the bounded wait for platform initialization.
    #[must_use]
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Set the margin added to each offline utterance's duration.
    #[must_use]
    pub fn with_playback_margin(mut self, margin: Duration) -> Self {
        self.playback_margin = margin;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
