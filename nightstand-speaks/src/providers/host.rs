//! Host built-in speech service.
//!
//! Drives the speech CLI that ships with the host OS (`say` on macOS,
//! `espeak-ng`/`espeak` or `spd-say` on Linux) as a [`PlatformSpeech`], so a
//! desktop build has a platform engine to fall back to.
//!
//! Every process runs under `tokio::process`: the voice listing is captured
//! once while connecting, and each utterance is owned by a task that feeds
//! its stdin and reaps it. Flushing aborts that task, which kills the child.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::SpeechError;
use crate::traits::{InitCallback, PlatformSpeech};
use crate::types::{DEFAULT_LOCALE, InitStatus, LanguageAvailability, QueueMode, UtteranceParams};

/// Speech CLIs in detection order.
#[cfg(target_os = "macos")]
const DETECTION_ORDER: &[HostProgram] = &[HostProgram::Say, HostProgram::ESpeakNg, HostProgram::ESpeak];

/// Speech CLIs in detection order.
#[cfg(not(target_os = "macos"))]
const DETECTION_ORDER: &[HostProgram] = &[HostProgram::ESpeakNg, HostProgram::ESpeak, HostProgram::SpdSay];

/// A host speech CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostProgram {
    /// macOS `say`.
    Say,
    /// `espeak-ng`.
    ESpeakNg,
    /// Legacy `espeak`.
    ESpeak,
    /// speech-dispatcher's `spd-say`.
    SpdSay,
}

impl HostProgram {
    pub fn binary(self) -> &'static str {
        match self {
            HostProgram::Say => "say",
            HostProgram::ESpeakNg => "espeak-ng",
            HostProgram::ESpeak => "espeak",
            HostProgram::SpdSay => "spd-say",
        }
    }

    /// First program in detection order found on `PATH`.
    pub fn detect() -> Option<Self> {
        DETECTION_ORDER
            .iter()
            .copied()
            .find(|program| which::which(program.binary()).is_ok())
    }

    /// Command-line arguments for one utterance; the text itself goes
    /// through stdin so it never needs shell escaping.
    fn speak_args(self, locale: &str, volume: f32) -> Vec<String> {
        let language = locale.to_lowercase();
        match self {
            // `say` has no volume flag and picks its voice from the system locale
            HostProgram::Say => Vec::new(),
            HostProgram::ESpeakNg | HostProgram::ESpeak => {
                let amplitude = (volume.clamp(0.0, 1.0) * 200.0).round() as u32;
                vec![
                    "-v".into(),
                    language,
                    "-a".into(),
                    amplitude.to_string(),
                    "--stdin".into(),
                ]
            }
            HostProgram::SpdSay => {
                let level = (volume.clamp(0.0, 1.0) * 200.0 - 100.0).round() as i32;
                vec![
                    "-l".into(),
                    language,
                    "-i".into(),
                    level.to_string(),
                    "-e".into(),
                ]
            }
        }
    }

    /// Arguments that list every installed voice, if the program can.
    fn voices_args(self) -> Option<&'static [&'static str]> {
        match self {
            HostProgram::Say => Some(&["-v", "?"][..]),
            HostProgram::ESpeakNg | HostProgram::ESpeak => Some(&["--voices"][..]),
            HostProgram::SpdSay => None,
        }
    }
}

/// The language part of a BCP-47 tag (`en-US` → `en`).
fn language_prefix(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or(locale)
        .to_lowercase()
}

/// Decide whether a voice listing covers `locale`.
///
/// - `say -v ?` prints `Name  en_US  # sample`, so the locale is matched
///   with an underscore.
/// - `espeak --voices` prints a header row, then one row per voice with the
///   language tag in the second column. A row for the bare language also
///   covers a regional request.
fn parse_voice_listing(program: HostProgram, locale: &str, listing: &str) -> LanguageAvailability {
    let found = match program {
        HostProgram::Say => {
            let wanted = locale.replace('-', "_").to_lowercase();
            listing
                .lines()
                .any(|line| line.split_whitespace().any(|token| token.to_lowercase() == wanted))
        }
        HostProgram::ESpeakNg | HostProgram::ESpeak => {
            let wanted = locale.replace('_', "-").to_lowercase();
            let language = language_prefix(locale);
            listing
                .lines()
                .skip(1)
                .filter_map(|line| line.split_whitespace().nth(1))
                .map(str::to_lowercase)
                .any(|tag| tag == wanted || tag == language)
        }
        HostProgram::SpdSay => true,
    };

    if found {
        LanguageAvailability::Available
    } else {
        LanguageAvailability::NotSupported
    }
}

/// Capture the program's voice listing; `None` when it has none to offer.
async fn list_voices(program: HostProgram) -> Option<String> {
    let args = program.voices_args()?;
    let output = Command::new(program.binary())
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => {
            warn!(status = %output.status, "{} could not list voices", program.binary());
            Some(String::new())
        }
        Err(e) => {
            warn!(error = %e, "failed to run {}", program.binary());
            Some(String::new())
        }
    }
}

/// Start one utterance process and the task that feeds and reaps it.
///
/// Aborting the returned task drops the child, which kills it.
fn spawn_utterance(
    runtime: &Handle,
    binary: &'static str,
    args: Vec<String>,
    text: String,
) -> Result<JoinHandle<()>, SpeechError> {
    let mut child = {
        let _entered = runtime.enter();
        Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::playback(format!("failed to start {binary}: {e}")))?
    };
    let stdin = child.stdin.take();

    Ok(runtime.spawn(async move {
        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.write_all(text.as_bytes()).await {
                warn!(error = %e, "failed to pass utterance to {binary}");
                return;
            }
            // dropping stdin sends EOF
        }

        match child.wait().await {
            Ok(status) if status.success() => debug!("{binary} finished speaking"),
            Ok(status) => warn!(%status, "{binary} exited with an error"),
            Err(e) => warn!(error = %e, "failed to wait for {binary}"),
        }
    }))
}

#[derive(Debug, Default)]
struct HostState {
    program: Option<HostProgram>,
    /// Voice listing captured while connecting.
    voices: Option<String>,
    locale: Option<String>,
}

/// [`PlatformSpeech`] backed by the host's speech CLI.
///
/// ## Examples
///
/// ```ignore
/// use std::sync::Arc;
/// use nightstand_speaks::{HostSpeech, PlatformEngine, SpeechConfig, SpeechEngine};
///
/// let engine = PlatformEngine::new(SpeechConfig::default(), Arc::new(HostSpeech::new()));
/// engine.initialize().await?;
/// engine.speak("Hello from the host").await?;
/// ```
#[derive(Debug, Default)]
pub struct HostSpeech {
    state: Arc<Mutex<HostState>>,
    current: Mutex<Option<JoinHandle<()>>>,
}

impl HostSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    fn kill_current(&self) {
        let task = self.current.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl PlatformSpeech for HostSpeech {
    fn connect(&self, on_ready: InitCallback) {
        let Ok(runtime) = Handle::try_current() else {
            on_ready(InitStatus::Error("host speech needs a tokio runtime".into()));
            return;
        };

        let state = Arc::clone(&self.state);
        runtime.spawn(async move {
            let Some(program) = HostProgram::detect() else {
                on_ready(InitStatus::Error("no host speech program on PATH".into()));
                return;
            };
            debug!(binary = program.binary(), "host speech program found");

            let voices = list_voices(program).await;
            if let Ok(mut guard) = state.lock() {
                guard.program = Some(program);
                guard.voices = voices;
            }
            on_ready(InitStatus::Success);
        });
    }

    fn set_language(&self, locale: &str) -> LanguageAvailability {
        let Ok(mut state) = self.state.lock() else {
            return LanguageAvailability::NotSupported;
        };
        let Some(program) = state.program else {
            return LanguageAvailability::NotSupported;
        };

        let availability = match &state.voices {
            Some(listing) => parse_voice_listing(program, locale, listing),
            None => LanguageAvailability::Available,
        };
        if availability.is_available() {
            state.locale = Some(locale.to_string());
        }
        availability
    }

    fn speak(&self, text: &str, mode: QueueMode, params: &UtteranceParams) -> Result<(), SpeechError> {
        let (program, locale) = {
            let state = self
                .state
                .lock()
                .map_err(|_| SpeechError::playback("host speech state is poisoned"))?;
            let program = state
                .program
                .ok_or(SpeechError::NotInitialized { engine: "host" })?;
            let locale = state
                .locale
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
            (program, locale)
        };
        let runtime = Handle::try_current()
            .map_err(|_| SpeechError::playback("host speech needs a tokio runtime"))?;

        if mode == QueueMode::Flush {
            self.kill_current();
        }

        let task = spawn_utterance(
            &runtime,
            program.binary(),
            program.speak_args(&locale, params.volume),
            text.to_string(),
        )?;
        debug!(utterance = %params.utterance_id, binary = program.binary(), "host utterance started");

        if let Ok(mut guard) = self.current.lock() {
            // a queued utterance keeps running detached
            *guard = Some(task);
        }
        Ok(())
    }

    fn stop(&self) {
        self.kill_current();
    }

    fn shutdown(&self) {
        self.kill_current();
        if let Ok(mut state) = self.state.lock() {
            *state = HostState::default();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
