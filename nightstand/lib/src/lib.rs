//! Nightstand library: a single-slot alarm clock with snooze and a to-do list
//! that can be read aloud.
//!
//! ## Alarm Slot
//!
//! - [`AlarmScheduler`] - Schedules, cancels and reconciles the one alarm
//! - [`SnoozeCoordinator`] - Re-arms the alarm one snooze interval later
//! - [`AlarmRecord`] - The persisted alarm
//!
//! ## Delivery
//!
//! - [`TokioTimerPort`] - In-process exact timer delivering [`AlarmIntent`]s
//! - [`AlarmDeliveryHandler`] - Filters intents and launches the ringing surface
//! - [`RingingSurface`] - Dismiss and snooze from the ringing alarm
//!
//! ## Storage
//!
//! - [`AlarmStore`] - Trait for alarm storage backends
//! - [`JsonFileStore`] - JSON file storage with file locking
//! - [`MemoryStore`] - In-memory storage
//!
//! ## Setup
//!
//! - [`NightstandConfig`] - File and environment configuration
//! - [`init_logging`] - Tracing subscriber setup
//! - [`parse_alarm_time`] / [`next_trigger_at`] - Wake time helpers
//! - [`Nightstand`] - Every component wired together

mod app;
mod clock;
pub mod config;
mod delivery;
mod error;
pub mod logging;
mod parse;
mod ringing;
mod scheduler;
mod snooze;
mod store;
mod timer;
pub mod todo;
mod types;

pub use app::{FileScheduler, Nightstand};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LoggingConfig, NightstandConfig, SpeechSettings};
pub use delivery::{AlarmDeliveryHandler, RingingHost, RingingLauncher, spawn_delivery_loop};
pub use error::{AlarmError, ConfigError, StoreError, TimerError};
pub use logging::init_logging;
pub use parse::{next_trigger_at, parse_alarm_time};
pub use ringing::{RingingOutcome, RingingPhase, RingingSurface};
pub use scheduler::{AlarmScheduler, Reconciliation, SchedulerOptions};
pub use snooze::SnoozeCoordinator;
pub use store::{AlarmStore, JsonFileStore, MemoryStore, STORE_VERSION};
pub use timer::{ExactAlarmGate, ExactTimerPort, TokioTimerPort};
pub use todo::{TodoItem, read_aloud, read_aloud_script};
pub use types::{
    ALARM_ACTION, ALARM_REQUEST_CODE, AlarmFired, AlarmIntent, AlarmRecord,
    DEFAULT_SNOOZE_INTERVAL_MILLIS, LaunchFlags, PendingAlarm, TimerToken,
};
