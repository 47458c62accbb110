//! In-memory stand-ins for the model, audio output and platform service.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::SpeechError;
use crate::traits::{AudioSink, AudioTrack, InitCallback, ModelLoader, PlatformSpeech, Synthesizer};
use crate::types::{
    GeneratedAudio, InitStatus, LanguageAvailability, PcmFormat, QueueMode, UtteranceParams,
};

pub const FAKE_SAMPLE_RATE: u32 = 16_000;

// ============================================================================
// Model
// ============================================================================

pub struct FakeLoader {
    samples: Arc<AtomicUsize>,
    texts: Arc<Mutex<Vec<String>>>,
    loads: Arc<AtomicUsize>,
    fail: bool,
    load_delay: Option<Duration>,
}

impl FakeLoader {
    /// A loader whose synthesizer returns `samples` samples at 16 kHz.
    pub fn new(samples: usize) -> Self {
        Self {
            samples: Arc::new(AtomicUsize::new(samples)),
            texts: Arc::default(),
            loads: Arc::default(),
            fail: false,
            load_delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0)
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn loads(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }

    pub fn texts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.texts)
    }

    pub fn samples(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.samples)
    }
}

impl ModelLoader for FakeLoader {
    fn load(&self) -> Result<Box<dyn Synthesizer>, SpeechError> {
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SpeechError::unsupported("model not bundled"));
        }
        Ok(Box::new(FakeSynth {
            samples: Arc::clone(&self.samples),
            texts: Arc::clone(&self.texts),
        }))
    }
}

struct FakeSynth {
    samples: Arc<AtomicUsize>,
    texts: Arc<Mutex<Vec<String>>>,
}

impl Synthesizer for FakeSynth {
    fn generate(&self, text: &str) -> Result<GeneratedAudio, SpeechError> {
        self.texts.lock().unwrap().push(text.to_string());
        let count = self.samples.load(Ordering::SeqCst);
        Ok(GeneratedAudio::new(vec![0.25; count], FAKE_SAMPLE_RATE))
    }
}

// ============================================================================
// Audio output
// ============================================================================

/// Records every track operation as `"<op>:<track>"`.
#[derive(Clone, Default)]
pub struct FakeSink {
    events: Arc<Mutex<Vec<String>>>,
    opened: Arc<AtomicUsize>,
    reject_next_write: Arc<AtomicBool>,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Make the next track accept zero samples.
    pub fn reject_next_write(&self) {
        self.reject_next_write.store(true, Ordering::SeqCst);
    }
}

impl AudioSink for FakeSink {
    fn open_static(&self, _format: PcmFormat, _len: usize) -> Result<Box<dyn AudioTrack>, SpeechError> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.lock().unwrap().push(format!("open:{id}"));
        Ok(Box::new(FakeTrack {
            id,
            events: Arc::clone(&self.events),
            playing: false,
            reject: self.reject_next_write.swap(false, Ordering::SeqCst),
        }))
    }
}

struct FakeTrack {
    id: usize,
    events: Arc<Mutex<Vec<String>>>,
    playing: bool,
    reject: bool,
}

impl FakeTrack {
    fn record(&self, op: &str) {
        self.events.lock().unwrap().push(format!("{op}:{}", self.id));
    }
}

impl AudioTrack for FakeTrack {
    fn write(&mut self, samples: &[f32]) -> Result<usize, SpeechError> {
        let written = if self.reject { 0 } else { samples.len() };
        self.events
            .lock()
            .unwrap()
            .push(format!("write:{}:{written}", self.id));
        Ok(written)
    }

    fn play(&mut self) -> Result<(), SpeechError> {
        self.playing = true;
        self.record("play");
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn stop(&mut self) {
        self.playing = false;
        self.record("stop");
    }

    fn flush(&mut self) {
        self.record("flush");
    }

    fn release(&mut self) {
        self.record("release");
    }
}

// ============================================================================
// Platform service
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitBehavior {
    /// Report success from another thread.
    Ready,
    /// Report an error status from another thread.
    Fail,
    /// Hold on to the callback and never call it.
    Never,
}

pub struct FakePlatform {
    behavior: InitBehavior,
    supported: Vec<String>,
    held: Mutex<Option<InitCallback>>,
    pub connects: AtomicUsize,
    pub languages: Mutex<Vec<String>>,
    pub spoken: Mutex<Vec<(String, QueueMode, f32)>>,
    pub stops: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl FakePlatform {
    pub fn new(behavior: InitBehavior) -> Arc<Self> {
        Self::with_locales(behavior, &["en-US"])
    }

    pub fn with_locales(behavior: InitBehavior, supported: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            supported: supported.iter().map(|s| s.to_string()).collect(),
            held: Mutex::new(None),
            connects: AtomicUsize::new(0),
            languages: Mutex::default(),
            spoken: Mutex::default(),
            stops: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _, _)| text.clone())
            .collect()
    }
}

impl PlatformSpeech for FakePlatform {
    fn connect(&self, on_ready: InitCallback) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            InitBehavior::Ready => {
                std::thread::spawn(move || on_ready(InitStatus::Success));
            }
            InitBehavior::Fail => {
                std::thread::spawn(move || on_ready(InitStatus::Error("status=-1".into())));
            }
            InitBehavior::Never => {
                *self.held.lock().unwrap() = Some(on_ready);
            }
        }
    }

    fn set_language(&self, locale: &str) -> LanguageAvailability {
        self.languages.lock().unwrap().push(locale.to_string());
        if self.supported.iter().any(|s| s == locale) {
            LanguageAvailability::Available
        } else {
            LanguageAvailability::NotSupported
        }
    }

    fn speak(&self, text: &str, mode: QueueMode, params: &UtteranceParams) -> Result<(), SpeechError> {
        self.spoken
            .lock()
            .unwrap()
            .push((text.to_string(), mode, params.volume));
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
