use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use uuid::Uuid;

use crate::message::codec::MAX_TIME_TO_LIVE_SECS;
use crate::utils::error::BusError;

/// Lifecycle state the broker reports for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageState {
    Active,
    Deferred,
    Scheduled,
}

impl MessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Deferred => "Deferred",
            Self::Scheduled => "Scheduled",
        }
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageState {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Deferred" => Ok(Self::Deferred),
            "Scheduled" => Ok(Self::Scheduled),
            other => Err(BusError::Codec(format!("unknown message state '{other}'"))),
        }
    }
}

/// Broker-managed message fields.
///
/// Every field is optional; `None` means "not set" and is left out of the
/// encoded header entirely. A `time_to_live` of [`Duration::MAX`] means the
/// message never expires.
///
/// The header carries timestamps to the second and TTLs to the
/// millisecond. The builders truncate to that precision; fields assigned
/// directly can be brought in line with [`normalized`](Self::normalized).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub correlation_id: Option<String>,
    pub session_id: Option<String>,
    pub delivery_count: Option<u32>,
    /// Present only on messages delivered under peek-lock.
    pub lock_token: Option<Uuid>,
    pub message_id: Option<String>,
    pub label: Option<String>,
    pub reply_to: Option<String>,
    /// Assigned by the broker, monotonic per entity.
    pub sequence_number: Option<i64>,
    pub to: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub scheduled_enqueue_time: Option<DateTime<Utc>>,
    pub time_to_live: Option<Duration>,
    pub reply_to_session_id: Option<String>,
    pub state: Option<MessageState>,
    pub enqueued_sequence_number: Option<i64>,
    pub partition_key: Option<String>,
    pub enqueued_time: Option<DateTime<Utc>>,
    pub via_partition_key: Option<String>,
    pub force_persistence: Option<bool>,
}

impl MessageEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Truncated to whole milliseconds; anything at or beyond the broker
    /// maximum becomes [`Duration::MAX`].
    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(normalize_time_to_live(ttl));
        self
    }

    /// Truncated to whole seconds.
    pub fn with_scheduled_enqueue_time(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_enqueue_time = Some(truncate_to_seconds(at));
        self
    }

    /// The envelope as it reads back after a trip through the header.
    pub fn normalized(mut self) -> Self {
        self.locked_until = self.locked_until.map(truncate_to_seconds);
        self.scheduled_enqueue_time = self.scheduled_enqueue_time.map(truncate_to_seconds);
        self.enqueued_time = self.enqueued_time.map(truncate_to_seconds);
        self.time_to_live = self.time_to_live.map(normalize_time_to_live);
        self
    }
}

pub(crate) fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_nanosecond(0).unwrap_or(at)
}

pub(crate) fn normalize_time_to_live(ttl: Duration) -> Duration {
    if ttl.as_secs_f64() >= MAX_TIME_TO_LIVE_SECS {
        return Duration::MAX;
    }
    u64::try_from(ttl.as_millis()).map_or(Duration::MAX, Duration::from_millis)
}
