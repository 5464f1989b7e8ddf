//! Envelope and custom-property encoding over HTTP headers.
//!
//! The broker-managed fields travel as a single JSON object in the
//! `BrokerProperties` header; unset fields are omitted rather than sent as
//! null. Custom properties are plain headers, one per value.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::envelope::{
    MessageEnvelope, MessageState, normalize_time_to_live, truncate_to_seconds,
};
use crate::message::message::Message;
use crate::message::properties::CustomProperties;
use crate::transport::HttpResponse;
use crate::utils::error::{BusError, Result};

pub const BROKER_PROPERTIES_HEADER: &str = "BrokerProperties";
pub const LOCATION_HEADER: &str = "Location";

/// The broker's largest time-to-live, in seconds. It stands for "never
/// expires" and maps to [`Duration::MAX`].
pub const MAX_TIME_TO_LIVE_SECS: f64 = 922_337_203_685.477_580_7;

/// Values this close to [`MAX_TIME_TO_LIVE_SECS`] are the sentinel. An f64
/// near the maximum is only accurate to about 1.2e-4 s, and the largest
/// finite TTL the envelope holds sits a whole millisecond lower.
const SENTINEL_TOLERANCE_SECS: f64 = 1e-4;

/// RFC 1123 layout used for every timestamp in the envelope.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Response headers that belong to HTTP itself and never become custom
/// properties.
const RESERVED_HEADERS: &[&str] = &[
    "brokerproperties",
    "connection",
    "content-encoding",
    "content-length",
    "content-type",
    "contenttype",
    "date",
    "keep-alive",
    "location",
    "server",
    "strict-transport-security",
    "transfer-encoding",
];

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnvelopeWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delivery_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lock_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locked_until_utc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheduled_enqueue_time_utc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_to_live: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enqueued_sequence_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enqueued_time_utc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    via_partition_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    force_persistence: Option<bool>,
}

/// Serializes the envelope into the `BrokerProperties` header value.
pub fn encode_envelope(envelope: &MessageEnvelope) -> Result<String> {
    let wire = EnvelopeWire {
        correlation_id: envelope.correlation_id.clone(),
        session_id: envelope.session_id.clone(),
        delivery_count: envelope.delivery_count,
        lock_token: envelope.lock_token.map(|t| t.to_string()),
        message_id: envelope.message_id.clone(),
        label: envelope.label.clone(),
        reply_to: envelope.reply_to.clone(),
        sequence_number: envelope.sequence_number,
        to: envelope.to.clone(),
        locked_until_utc: envelope.locked_until.map(format_date),
        scheduled_enqueue_time_utc: envelope.scheduled_enqueue_time.map(format_date),
        time_to_live: envelope.time_to_live.map(encode_ttl),
        reply_to_session_id: envelope.reply_to_session_id.clone(),
        state: envelope.state.map(|s| s.as_str().to_string()),
        enqueued_sequence_number: envelope.enqueued_sequence_number,
        partition_key: envelope.partition_key.clone(),
        enqueued_time_utc: envelope.enqueued_time.map(format_date),
        via_partition_key: envelope.via_partition_key.clone(),
        force_persistence: envelope.force_persistence,
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Parses a `BrokerProperties` header value.
///
/// Values come back at envelope precision (see [`MessageEnvelope`]), so
/// decoding what [`encode_envelope`] produced gives back the normalized
/// envelope. Dates and durations that cannot be read are dropped. An unknown state
/// or a malformed lock token is rejected.
pub fn decode_envelope(raw: &str) -> Result<MessageEnvelope> {
    let wire: EnvelopeWire = serde_json::from_str(raw)?;

    let lock_token = wire
        .lock_token
        .as_deref()
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|e| BusError::Codec(format!("invalid lock token: {e}")))?;
    let state = wire
        .state
        .as_deref()
        .map(str::parse::<MessageState>)
        .transpose()?;

    Ok(MessageEnvelope {
        correlation_id: wire.correlation_id,
        session_id: wire.session_id,
        delivery_count: wire.delivery_count,
        lock_token,
        message_id: wire.message_id,
        label: wire.label,
        reply_to: wire.reply_to,
        sequence_number: wire.sequence_number,
        to: wire.to,
        locked_until: wire.locked_until_utc.as_deref().and_then(parse_date),
        scheduled_enqueue_time: wire
            .scheduled_enqueue_time_utc
            .as_deref()
            .and_then(parse_date),
        time_to_live: wire.time_to_live.and_then(decode_ttl),
        reply_to_session_id: wire.reply_to_session_id,
        state,
        enqueued_sequence_number: wire.enqueued_sequence_number,
        partition_key: wire.partition_key,
        enqueued_time: wire.enqueued_time_utc.as_deref().and_then(parse_date),
        via_partition_key: wire.via_partition_key,
        force_persistence: wire.force_persistence,
    })
}

/// Headers to send with a message: the envelope, then one header per custom
/// property value.
pub fn encode_headers(message: &Message) -> Result<Vec<(String, String)>> {
    let mut headers = Vec::with_capacity(message.properties.len() + 1);
    headers.push((
        BROKER_PROPERTIES_HEADER.to_string(),
        encode_envelope(&message.envelope)?,
    ));
    for (key, value) in message.properties.iter() {
        headers.push((key.to_string(), value.to_string()));
    }
    Ok(headers)
}

/// Rebuilds a message from a successful receive response.
///
/// A response without the envelope header carries no message and yields
/// `None`. `keep_location` captures the `Location` header for later lock
/// operations.
pub fn decode_message(response: &HttpResponse, keep_location: bool) -> Result<Option<Message>> {
    let Some(raw) = response.header(BROKER_PROPERTIES_HEADER) else {
        return Ok(None);
    };
    let envelope = decode_envelope(raw)?;

    let mut properties = CustomProperties::new();
    for (name, value) in &response.headers {
        if is_reserved_header(name) {
            continue;
        }
        properties.insert(name.clone(), value.trim_matches('"'));
    }

    let location = if keep_location {
        response.header(LOCATION_HEADER).map(str::to_string)
    } else {
        None
    };

    Ok(Some(Message {
        body: response.body.clone(),
        location,
        envelope,
        properties,
    }))
}

pub fn is_reserved_header(name: &str) -> bool {
    RESERVED_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = if let Ok(at) = DateTime::parse_from_rfc2822(raw) {
        at.with_timezone(&Utc)
    } else if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        at.with_timezone(&Utc)
    } else {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .and_utc()
    };
    Some(truncate_to_seconds(parsed))
}

fn encode_ttl(ttl: Duration) -> f64 {
    let ttl = normalize_time_to_live(ttl);
    if ttl == Duration::MAX {
        MAX_TIME_TO_LIVE_SECS
    } else {
        ttl.as_millis() as f64 / 1000.0
    }
}

fn decode_ttl(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    // The sentinel never goes through a seconds conversion.
    if secs >= MAX_TIME_TO_LIVE_SECS - SENTINEL_TOLERANCE_SECS {
        return Some(Duration::MAX);
    }
    Some(Duration::from_millis((secs * 1000.0).round() as u64))
}
