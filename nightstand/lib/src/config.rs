//! Configuration loading.
//!
//! Settings live in a JSON file (by default `<config dir>/nightstand/config.json`).
//! A missing file yields the defaults; environment variables override
//! individual values:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `NIGHTSTAND_STORE` | `store_path` |
//! | `NIGHTSTAND_SNOOZE_MINUTES` | `snooze_minutes` |
//! | `NIGHTSTAND_SPEECH_PREFERENCE` | `speech.preference` |
//! | `NIGHTSTAND_MODEL_DIR` | `speech.model_dir` |
//! | `NIGHTSTAND_LOG` | `logging.filter` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use nightstand_speaks::{BackendPreference, DEFAULT_LOCALE, SpeechConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::scheduler::SchedulerOptions;
use crate::timer::ExactAlarmGate;

const APP_DIR: &str = "nightstand";
const CONFIG_FILE: &str = "config.json";
const STORE_FILE: &str = "alarm.json";

pub const ENV_STORE: &str = "NIGHTSTAND_STORE";
pub const ENV_SNOOZE_MINUTES: &str = "NIGHTSTAND_SNOOZE_MINUTES";
pub const ENV_SPEECH_PREFERENCE: &str = "NIGHTSTAND_SPEECH_PREFERENCE";
pub const ENV_MODEL_DIR: &str = "NIGHTSTAND_MODEL_DIR";
pub const ENV_LOG: &str = "NIGHTSTAND_LOG";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NightstandConfig {
    /// Alarm file; `None` means `<data dir>/nightstand/alarm.json`.
    pub store_path: Option<PathBuf>,
    pub snooze_minutes: u32,
    pub use_alarm_clock_ui: bool,
    pub exact_alarm_gate: ExactAlarmGate,
    pub speech: SpeechSettings,
    pub logging: LoggingConfig,
}

impl Default for NightstandConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            snooze_minutes: 9,
            use_alarm_clock_ui: true,
            exact_alarm_gate: ExactAlarmGate::default(),
            speech: SpeechSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Speech engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    pub preference: BackendPreference,
    pub locale: String,
    /// Directory holding a bundled offline voice model.
    pub model_dir: Option<PathBuf>,
    pub init_timeout_ms: u64,
    pub playback_margin_ms: u64,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            preference: BackendPreference::default(),
            locale: DEFAULT_LOCALE.to_string(),
            model_dir: None,
            init_timeout_ms: 10_000,
            playback_margin_ms: 120,
        }
    }
}

impl SpeechSettings {
    pub fn speech_config(&self) -> SpeechConfig {
        SpeechConfig::new()
            .with_locale(self.locale.clone())
            .with_init_timeout(Duration::from_millis(self.init_timeout_ms))
            .with_playback_margin(Duration::from_millis(self.playback_margin_ms))
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `info` or `nightstand_lib=debug`.
    pub filter: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file: None,
        }
    }
}

impl NightstandConfig {
    /// `<config dir>/nightstand/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// `<data dir>/nightstand/alarm.json`, if the platform has a data dir.
    pub fn default_store_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join(APP_DIR).join(STORE_FILE))
    }

    /// Loads the default config file and applies environment overrides.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// an override is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, or the defaults if it does not exist.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `NIGHTSTAND_*` overrides from the process environment.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unparsable override.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unparsable override.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = lookup(ENV_STORE) {
            self.store_path = Some(PathBuf::from(path));
        }
        if let Some(minutes) = lookup(ENV_SNOOZE_MINUTES) {
            self.snooze_minutes = minutes.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_SNOOZE_MINUTES.to_string(),
                message: format!("expected a whole number of minutes, got {minutes:?}"),
            })?;
        }
        if let Some(preference) = lookup(ENV_SPEECH_PREFERENCE) {
            self.speech.preference =
                preference
                    .parse()
                    .map_err(|message: String| ConfigError::InvalidValue {
                        key: ENV_SPEECH_PREFERENCE.to_string(),
                        message,
                    })?;
        }
        if let Some(dir) = lookup(ENV_MODEL_DIR) {
            self.speech.model_dir = Some(PathBuf::from(dir));
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.logging.filter = filter;
        }
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snooze_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "snooze_minutes".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.speech.init_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "speech.init_timeout_ms".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The alarm file to use.
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .or_else(Self::default_store_path)
            .unwrap_or_else(|| PathBuf::from(STORE_FILE))
    }

    pub fn snooze_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.snooze_minutes) * 60)
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            use_alarm_clock_ui: self.use_alarm_clock_ui,
            gate: self.exact_alarm_gate,
        }
    }
}
