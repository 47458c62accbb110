//! Persistence for the single alarm slot.
//!
//! The alarm is persisted as three scalar keys (`alarm_trigger_at`,
//! `alarm_label`, `alarm_is_snoozed`) inside a versioned JSON envelope:
//!
//! ```json
//! { "version": 1, "values": { "alarm_trigger_at": 1767250800000, "alarm_label": "Wake up", "alarm_is_snoozed": false } }
//! ```
//!
//! A missing `alarm_trigger_at` means "no alarm". Writes go to a temp file in
//! the same directory and are renamed into place, under an exclusive `fs2`
//! lock on a sidecar `.lock` file.

use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::types::{AlarmRecord, normalize_label};

/// Envelope version written by this crate.
pub const STORE_VERSION: u32 = 1;

/// Storage backend for the alarm slot.
pub trait AlarmStore: Send + Sync {
    /// Loads the persisted alarm, if any.
    ///
    /// ## Errors
    ///
    /// Returns an error if reading or parsing fails.
    fn load(&self) -> impl Future<Output = Result<Option<AlarmRecord>, StoreError>> + Send;

    /// Overwrites the persisted alarm.
    ///
    /// ## Errors
    ///
    /// Returns an error if writing fails.
    fn save(&self, record: &AlarmRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes the persisted alarm. Clearing an empty store is not an error.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be removed.
    fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    #[serde(default)]
    values: StoredValues,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alarm_trigger_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alarm_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alarm_is_snoozed: Option<bool>,
}

impl From<&AlarmRecord> for StoredValues {
    fn from(record: &AlarmRecord) -> Self {
        Self {
            alarm_trigger_at: Some(record.trigger_at_millis),
            alarm_label: record.label.clone(),
            alarm_is_snoozed: Some(record.is_snoozed),
        }
    }
}

impl StoredValues {
    fn into_record(self) -> Option<AlarmRecord> {
        let trigger_at_millis = self.alarm_trigger_at?;
        Some(AlarmRecord {
            trigger_at_millis,
            label: normalize_label(self.alarm_label),
            is_snoozed: self.alarm_is_snoozed.unwrap_or(false),
        })
    }
}

/// JSON file alarm storage.
///
/// ## Examples
///
/// ```no_run
/// use nightstand_lib::{AlarmRecord, AlarmStore, JsonFileStore};
///
/// # async fn example() -> Result<(), nightstand_lib::StoreError> {
/// let store = JsonFileStore::new("/tmp/nightstand-alarm.json".into());
/// store.save(&AlarmRecord::new(1_767_250_800_000, Some("Wake up".into()), false)).await?;
/// assert!(store.load().await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a new JSON file store at the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the path to the alarm file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn lock_path(path: &Path) -> PathBuf {
        path.with_extension("lock")
    }

    fn open_lock(path: &Path) -> Result<File, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let lock_path = Self::lock_path(path);
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)?)
    }

    fn read_blocking(path: &Path) -> Result<Option<AlarmRecord>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }

        let lock = Self::open_lock(path)?;
        lock.lock_shared().map_err(|_| StoreError::Lock {
            path: path.to_path_buf(),
        })?;

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                lock.unlock().map_err(|_| StoreError::Lock {
                    path: path.to_path_buf(),
                })?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        lock.unlock().map_err(|_| StoreError::Lock {
            path: path.to_path_buf(),
        })?;

        if content.trim().is_empty() {
            return Ok(None);
        }

        let envelope: Envelope = serde_json::from_str(&content)?;
        if envelope.version != STORE_VERSION {
            return Err(StoreError::SchemaMismatch {
                found: envelope.version,
                expected: STORE_VERSION,
            });
        }

        Ok(envelope.values.into_record())
    }

    fn write_blocking(path: &Path, record: &AlarmRecord) -> Result<(), StoreError> {
        let lock = Self::open_lock(path)?;
        lock.lock_exclusive().map_err(|_| StoreError::Lock {
            path: path.to_path_buf(),
        })?;

        let envelope = Envelope {
            version: STORE_VERSION,
            values: StoredValues::from(record),
        };
        let json = serde_json::to_string_pretty(&envelope)?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        // same directory so the rename stays on one filesystem
        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;
        temp_file.persist(path).map_err(|e| StoreError::Io(e.error))?;

        lock.unlock().map_err(|_| StoreError::Lock {
            path: path.to_path_buf(),
        })?;
        Ok(())
    }

    fn clear_blocking(path: &Path) -> Result<(), StoreError> {
        let lock = Self::open_lock(path)?;
        lock.lock_exclusive().map_err(|_| StoreError::Lock {
            path: path.to_path_buf(),
        })?;

        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        lock.unlock().map_err(|_| StoreError::Lock {
            path: path.to_path_buf(),
        })?;
        Ok(())
    }
}

impl AlarmStore for JsonFileStore {
    async fn load(&self) -> Result<Option<AlarmRecord>, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_blocking(&path)).await?
    }

    async fn save(&self, record: &AlarmRecord) -> Result<(), StoreError> {
        let path = self.path.clone();
        let trigger_at = record.trigger_at_millis;
        let record = record.clone();
        tokio::task::spawn_blocking(move || Self::write_blocking(&path, &record)).await??;
        debug!(path = %self.path.display(), trigger_at, "alarm persisted");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::clear_blocking(&path)).await??;
        debug!(path = %self.path.display(), "alarm cleared");
        Ok(())
    }
}

/// In-memory alarm storage for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<AlarmRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `record`.
    pub fn with_record(record: AlarmRecord) -> Self {
        Self {
            slot: Mutex::new(Some(record)),
        }
    }
}

impl AlarmStore for MemoryStore {
    async fn load(&self) -> Result<Option<AlarmRecord>, StoreError> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, record: &AlarmRecord) -> Result<(), StoreError> {
        *self.slot.lock().await = Some(record.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.slot.lock().await.take();
        Ok(())
    }
}
