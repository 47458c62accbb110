//! Concrete backends for the engine seams.
//!
//! - [`host`] - the host OS speech CLI as a platform speech service
//! - [`sherpa`] - the sherpa-onnx runtime as the offline model loader
//! - `playback` - rodio audio output for the offline engine (feature `rodio`)

pub mod host;
pub mod sherpa;
#[cfg(feature = "rodio")]
pub mod playback;

pub use host::{HostProgram, HostSpeech};
pub use sherpa::{SHERPA_BINARY, SherpaLoader, SherpaSynthesizer, decode_wav};
#[cfg(feature = "rodio")]
pub use playback::RodioSink;
