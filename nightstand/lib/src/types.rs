//! Core data types for the alarm slot.

use std::ops::BitOr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action tag carried by every alarm intent this crate arms.
pub const ALARM_ACTION: &str = "com.smartalarm.action.TRIGGER_ALARM";

/// Fixed request code of the single alarm slot.
pub const ALARM_REQUEST_CODE: i32 = 1201;

/// Default snooze interval: 9 minutes.
pub const DEFAULT_SNOOZE_INTERVAL_MILLIS: i64 = 9 * 60 * 1000;

/// The one persisted alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    /// Absolute wake time in Unix epoch milliseconds.
    pub trigger_at_millis: i64,
    /// Display label; blank labels are stored as `None`.
    pub label: Option<String>,
    /// Whether this alarm was produced by a snooze.
    pub is_snoozed: bool,
}

impl AlarmRecord {
    /// Creates a record, normalizing a blank label to `None`.
    pub fn new(trigger_at_millis: i64, label: Option<String>, is_snoozed: bool) -> Self {
        Self {
            trigger_at_millis,
            label: normalize_label(label),
            is_snoozed,
        }
    }

    /// The wake time as a UTC timestamp, if it is representable.
    pub fn trigger_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.trigger_at_millis)
    }

    /// The payload delivered when this alarm fires.
    pub fn fired(&self) -> AlarmFired {
        AlarmFired {
            trigger_at_millis: self.trigger_at_millis,
            label: self.label.clone(),
            is_snooze: self.is_snoozed,
        }
    }
}

/// Treats an all-whitespace label as no label.
pub(crate) fn normalize_label(label: Option<String>) -> Option<String> {
    label.filter(|l| !l.trim().is_empty())
}

/// Identity of an OS timer slot.
///
/// Arming and cancelling both derive the token from the same inputs, so a
/// re-arm replaces the previous timer and a cancel always finds it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub action: String,
    pub request_code: i32,
}

impl TimerToken {
    pub fn derive(action: &str, request_code: i32) -> Self {
        Self {
            action: action.to_string(),
            request_code,
        }
    }

    /// The token of the single alarm slot.
    pub fn alarm() -> Self {
        Self::derive(ALARM_ACTION, ALARM_REQUEST_CODE)
    }
}

/// Data carried from the scheduler to the ringing surface when the alarm fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmFired {
    pub trigger_at_millis: i64,
    pub label: Option<String>,
    pub is_snooze: bool,
}

/// A delivered timer event: an action tag plus the alarm payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmIntent {
    pub action: String,
    pub fired: AlarmFired,
}

/// What the timer port holds until the alarm fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAlarm {
    pub token: TimerToken,
    pub intent: AlarmIntent,
}

impl PendingAlarm {
    /// The pending timer for `record` in the alarm slot.
    pub fn for_record(record: &AlarmRecord) -> Self {
        let token = TimerToken::alarm();
        Self {
            intent: AlarmIntent {
                action: token.action.clone(),
                fired: record.fired(),
            },
            token,
        }
    }
}

/// How the ringing surface is brought to the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchFlags(u32);

impl LaunchFlags {
    /// Start in a new task when the app is not in the foreground.
    pub const NEW_TASK: Self = Self(1);
    /// Drop anything stacked above an existing surface.
    pub const CLEAR_TOP: Self = Self(1 << 1);
    /// Reuse an existing surface instead of creating a second one.
    pub const SINGLE_TOP: Self = Self(1 << 2);

    /// Flags used when an alarm fires.
    pub const ALARM: Self = Self(Self::NEW_TASK.0 | Self::CLEAR_TOP.0 | Self::SINGLE_TOP.0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LaunchFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
