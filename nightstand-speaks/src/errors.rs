use std::time::Duration;

/// Errors that can occur during speech operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// `speak` was called on an engine that never finished initializing
    /// (or has since been released).
    #[error("{engine} engine is not initialized")]
    NotInitialized {
        /// Name of the engine that rejected the call.
        engine: &'static str,
    },

    /// The engine cannot work in this deployment (model not bundled, no
    /// audio output). This is an expected outcome during `Auto` resolution.
    #[error("operation not supported: {reason}")]
    UnsupportedOperation {
        /// Why the engine is unusable here.
        reason: String,
    },

    /// Engine initialization failed.
    #[error("{engine} engine initialization failed: {message}")]
    InitFailed {
        /// Name of the engine that failed.
        engine: &'static str,
        /// Description reported by the backend.
        message: String,
    },

    /// The platform never reported back from initialization.
    #[error("{engine} engine did not finish initializing within {timeout:?}")]
    InitTimeout {
        /// Name of the engine that timed out.
        engine: &'static str,
        /// The bound that was exceeded.
        timeout: Duration,
    },

    /// Audio could not be buffered or written to the output.
    ///
    /// The engine stays usable for the next utterance.
    #[error("playback failed: {message}")]
    Playback {
        /// Description of the playback failure.
        message: String,
    },

    /// The synthesizer failed to produce audio for the text.
    #[error("speech synthesis failed: {source}")]
    Synthesis {
        /// The underlying error from the synthesizer.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A blocking worker task panicked or was cancelled.
    #[error("speech worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SpeechError {
    /// Build an [`SpeechError::UnsupportedOperation`] from any message.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        SpeechError::UnsupportedOperation {
            reason: reason.into(),
        }
    }

    /// Build a [`SpeechError::Playback`] from any message.
    pub fn playback(message: impl Into<String>) -> Self {
        SpeechError::Playback {
            message: message.into(),
        }
    }

    /// Build a [`SpeechError::Synthesis`] from an error or message.
    pub fn synthesis(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        SpeechError::Synthesis {
            source: source.into(),
        }
    }
}
