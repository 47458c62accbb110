//! Offline synthesis through the sherpa-onnx runtime.
//!
//! The bundled VITS model is run by the `sherpa-onnx-offline-tts` CLI, which
//! writes one WAV file per utterance. The WAV is decoded back into mono f32
//! PCM for the offline engine's static track.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tracing::{debug, info};

use crate::errors::SpeechError;
use crate::offline::ModelAssets;
use crate::traits::{ModelLoader, Synthesizer};
use crate::types::GeneratedAudio;

/// Runtime binary looked up on `PATH`.
pub const SHERPA_BINARY: &str = "sherpa-onnx-offline-tts";

/// Inference threads per utterance.
const DEFAULT_THREADS: u32 = 2;

/// [`ModelLoader`] that runs a bundled model with the sherpa-onnx CLI.
///
/// Loading fails with [`SpeechError::UnsupportedOperation`] only when the
/// model bundle or the runtime binary is missing.
///
/// ## Examples
///
/// ```ignore
/// use std::sync::Arc;
/// use nightstand_speaks::{OfflineEngine, SherpaLoader, SpeechConfig, SpeechEngine};
///
/// let loader = SherpaLoader::new(Some("/opt/voices/en_US-ljspeech".into()));
/// let engine = OfflineEngine::new(SpeechConfig::default(), Arc::new(loader), Some(sink));
/// engine.initialize().await?;
/// ```
#[derive(Debug, Clone)]
pub struct SherpaLoader {
    model_dir: Option<PathBuf>,
    binary: PathBuf,
    num_threads: u32,
}

impl SherpaLoader {
    pub fn new(model_dir: Option<PathBuf>) -> Self {
        Self {
            model_dir,
            binary: PathBuf::from(SHERPA_BINARY),
            num_threads: DEFAULT_THREADS,
        }
    }

    /// Use another runtime binary (a name on `PATH` or a full path).
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_num_threads(mut self, num_threads: u32) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }
}

impl ModelLoader for SherpaLoader {
    fn load(&self) -> Result<Box<dyn Synthesizer>, SpeechError> {
        let Some(dir) = &self.model_dir else {
            return Err(SpeechError::unsupported("no offline model configured"));
        };
        let assets = ModelAssets::locate(dir)?;
        let runtime = which::which(&self.binary).map_err(|_| {
            SpeechError::unsupported(format!(
                "offline runtime {} not found",
                self.binary.display()
            ))
        })?;

        info!(
            runtime = %runtime.display(),
            model = %assets.model.display(),
            "offline model located"
        );
        Ok(Box::new(SherpaSynthesizer {
            runtime,
            assets,
            num_threads: self.num_threads,
        }))
    }
}

/// One loaded model bound to its runtime binary.
#[derive(Debug)]
pub struct SherpaSynthesizer {
    runtime: PathBuf,
    assets: ModelAssets,
    num_threads: u32,
}

impl SherpaSynthesizer {
    fn args(&self, text: &str, output: &Path) -> Vec<OsString> {
        vec![
            flag("--vits-model=", &self.assets.model),
            flag("--vits-tokens=", &self.assets.tokens),
            flag("--vits-data-dir=", &self.assets.phoneme_data),
            format!("--num-threads={}", self.num_threads).into(),
            flag("--output-filename=", output),
            text.into(),
        ]
    }
}

fn flag(name: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(name);
    arg.push(path);
    arg
}

impl Synthesizer for SherpaSynthesizer {
    /// Runs on the blocking pool; the runtime process is awaited through
    /// the tokio handle of the calling runtime.
    fn generate(&self, text: &str) -> Result<GeneratedAudio, SpeechError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| SpeechError::unsupported("offline synthesis needs a tokio runtime"))?;

        // a fresh directory so the CLI never sees a pre-existing output file
        let workdir = tempfile::tempdir().map_err(SpeechError::synthesis)?;
        let output_path = workdir.path().join("utterance.wav");

        let mut cmd = tokio::process::Command::new(&self.runtime);
        cmd.args(self.args(text, &output_path));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!(chars = text.chars().count(), "running offline synthesis");
        let output = handle
            .block_on(cmd.output())
            .map_err(SpeechError::synthesis)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeechError::synthesis(format!(
                "{SHERPA_BINARY} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        decode_wav(&output_path)
    }
}

/// Decode a WAV file into mono f32 samples.
///
/// Integer samples are scaled into `[-1.0, 1.0)`; multi-channel frames are
/// averaged down to one channel.
pub fn decode_wav(path: &Path) -> Result<GeneratedAudio, SpeechError> {
    let mut reader = hound::WavReader::open(path).map_err(SpeechError::synthesis)?;
    let spec = reader.spec();

    let interleaved: Result<Vec<f32>, hound::Error> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
        hound::SampleFormat::Int => {
            let scale = (1_i64 << spec.bits_per_sample.saturating_sub(1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect()
        }
    };
    let interleaved = interleaved.map_err(SpeechError::synthesis)?;

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(GeneratedAudio::new(samples, spec.sample_rate))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::{MODEL_FILE, PHONEME_DATA_DIR, TOKENS_FILE};

    fn bundle(dir: &Path) {
        std::fs::write(dir.join(MODEL_FILE), b"onnx").unwrap();
        std::fs::write(dir.join(TOKENS_FILE), b"_ 0").unwrap();
        std::fs::create_dir(dir.join(PHONEME_DATA_DIR)).unwrap();
    }

    #[test]
    fn unconfigured_model_is_unsupported() {
        let err = SherpaLoader::new(None).load().err().unwrap();
        assert!(matches!(err, SpeechError::UnsupportedOperation { .. }));
    }

    #[test]
    fn incomplete_bundle_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MODEL_FILE), b"onnx").unwrap();

        let err = SherpaLoader::new(Some(dir.path().to_path_buf()))
            .load()
            .err()
            .unwrap();
        assert!(err.to_string().contains(TOKENS_FILE));
    }

    #[test]
    fn missing_runtime_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        bundle(dir.path());

        let err = SherpaLoader::new(Some(dir.path().to_path_buf()))
            .with_binary("nightstand-absent-tts-runtime")
            .load()
            .err()
            .unwrap();
        assert!(matches!(err, SpeechError::UnsupportedOperation { .. }));
        assert!(err.to_string().contains("nightstand-absent-tts-runtime"));
    }

    #[cfg(unix)]
    #[test]
    fn complete_bundle_with_runtime_loads() {
        let dir = tempfile::tempdir().unwrap();
        bundle(dir.path());

        // any executable stands in for the runtime at load time
        let loaded = SherpaLoader::new(Some(dir.path().to_path_buf()))
            .with_binary("/bin/sh")
            .load();
        assert!(loaded.is_ok());
    }

    #[cfg(unix)]
    fn fake_runtime(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-tts");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn generate_decodes_the_runtime_output() {
        let dir = tempfile::tempdir().unwrap();
        bundle(dir.path());

        let fixture = dir.path().join("fixture.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&fixture, spec).unwrap();
        writer.write_sample(16_384_i16).unwrap();
        writer.write_sample(16_384_i16).unwrap();
        writer.finalize().unwrap();

        let script = fake_runtime(
            dir.path(),
            &format!(
                "for arg in \"$@\"; do\n  case \"$arg\" in\n    --output-filename=*) cp \"{}\" \"${{arg#--output-filename=}}\" ;;\n  esac\ndone",
                fixture.display()
            ),
        );
        let synthesizer = SherpaLoader::new(Some(dir.path().to_path_buf()))
            .with_binary(script)
            .load()
            .unwrap();

        let audio = tokio::task::spawn_blocking(move || synthesizer.generate("Good morning"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.samples, vec![0.5, 0.5]);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_runtime_reports_its_stderr() {
        let dir = tempfile::tempdir().unwrap();
        bundle(dir.path());
        let script = fake_runtime(dir.path(), "echo 'model rejected' >&2\nexit 3");
        let synthesizer = SherpaLoader::new(Some(dir.path().to_path_buf()))
            .with_binary(script)
            .load()
            .unwrap();

        let err = tokio::task::spawn_blocking(move || synthesizer.generate("hello"))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SpeechError::Synthesis { .. }));
        assert!(err.to_string().contains("model rejected"));
    }

    #[test]
    fn runtime_arguments_point_at_the_bundle() {
        let dir = tempfile::tempdir().unwrap();
        bundle(dir.path());
        let synthesizer = SherpaSynthesizer {
            runtime: PathBuf::from(SHERPA_BINARY),
            assets: ModelAssets::locate(dir.path()).unwrap(),
            num_threads: 2,
        };

        let out = dir.path().join("out.wav");
        let args = synthesizer.args("Good morning", &out);

        let expected: Vec<OsString> = vec![
            flag("--vits-model=", &dir.path().join(MODEL_FILE)),
            flag("--vits-tokens=", &dir.path().join(TOKENS_FILE)),
            flag("--vits-data-dir=", &dir.path().join(PHONEME_DATA_DIR)),
            "--num-threads=2".into(),
            flag("--output-filename=", &out),
            "Good morning".into(),
        ];
        assert_eq!(args, expected);
    }

    #[test]
    fn decode_scales_integer_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [0_i16, 16_384, -32_768] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let audio = decode_wav(&path).unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn decode_averages_stereo_float_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [0.5_f32, 0.25, -1.0, 1.0] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let audio = decode_wav(&path).unwrap();
        assert_eq!(audio.samples, vec![0.375, 0.0]);
    }

    #[test]
    fn decode_rejects_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = decode_wav(&dir.path().join("absent.wav")).unwrap_err();
        assert!(matches!(err, SpeechError::Synthesis { .. }));
    }
}
