//! Core event types and the dotted-path field extraction shared by
//! validation, stream authorization and the producer layer.

pub mod error;

pub use error::{EventGateError, StatusKind, ValidationIssue};

use serde::Serialize;
use serde_json::Value;

use crate::producer::ProduceAck;

/// A single incoming event, as decoded from the request body.
pub type Event = Value;

/// The batch submitted in one request: a single object, or an array of them.
///
/// `Many` must be listed before `One`: untagged-enum deserialization tries
/// variants in declaration order, and `Value`'s `Deserialize` impl accepts
/// any JSON without error, so whichever variant comes first always wins. If
/// `One(Event)` came first, a JSON array body would deserialize as a single
/// `Event` holding the whole array instead of as N events.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum EventBatch {
    Many(Vec<Event>),
    One(Event),
}

impl EventBatch {
    pub fn into_vec(self) -> Vec<Event> {
        match self {
            EventBatch::Many(events) => events,
            EventBatch::One(e) => vec![e],
        }
    }
}

/// What gets attached to an [`EventStatus`] to explain its bucket.
///
/// Non-validation errors serialize to `{"message": ...}` only; validation
/// failures additionally carry the structured `errors` list. This is the
/// boundary the response body's field set is built around, not the
/// `EventGateError` variant itself.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatusContext {
    Ack(ProduceAck),
    Validation { errors: Vec<ValidationIssue> },
    Message { message: String },
}

impl StatusContext {
    pub fn from_error(error: &EventGateError) -> Self {
        match error {
            EventGateError::ValidationFailure { issues, .. } => StatusContext::Validation {
                errors: issues.clone(),
            },
            other => StatusContext::Message {
                message: other.to_string(),
            },
        }
    }
}

/// One event's outcome: which bucket it landed in, the (possibly
/// default-filled) event itself, and why.
#[derive(Debug, Clone, Serialize)]
pub struct EventStatus {
    pub status: StatusKind,
    pub event: Event,
    pub context: StatusContext,
}

/// The result of processing a batch: every event, partitioned by outcome, in
/// the order each bucket encountered them. Within a bucket arrival order is
/// preserved; across buckets it is not (a later `success` event can sit
/// ahead of an earlier `invalid` one in the response body).
#[derive(Debug, Default, Serialize)]
pub struct ProcessResult {
    pub success: Vec<EventStatus>,
    pub invalid: Vec<EventStatus>,
    pub error: Vec<EventStatus>,
}

impl ProcessResult {
    pub fn push(&mut self, status: EventStatus) {
        match status.status {
            StatusKind::Success => self.success.push(status),
            StatusKind::Invalid => self.invalid.push(status),
            StatusKind::Error => self.error.push(status),
        }
    }

    pub fn is_all_success(&self) -> bool {
        self.invalid.is_empty() && self.error.is_empty()
    }

    pub fn is_all_failure(&self) -> bool {
        self.success.is_empty()
    }
}

/// Looks up a dot-separated path (`"meta.stream"`) in a JSON object. No
/// escaping: a literal `.` inside a key is not representable.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = value;
    for key in path.split('.') {
        cur = cur.as_object()?.get(key)?;
    }
    Some(cur)
}

/// Returns the value at the first of `paths` that is present, in order.
pub fn extract_field<'a>(value: &'a Value, paths: &[String]) -> Result<&'a Value, EventGateError> {
    for path in paths {
        if let Some(v) = get_path(value, path) {
            return Ok(v);
        }
    }
    Err(EventGateError::MissingField {
        paths: paths.to_vec(),
    })
}

/// Like [`extract_field`] but requires the value to be a JSON string.
pub fn extract_str_field(value: &Value, paths: &[String]) -> Result<String, EventGateError> {
    let found = extract_field(value, paths)?;
    found
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| EventGateError::MissingField {
            paths: paths.to_vec(),
        })
}

/// Sets a dot-separated path in a JSON object, creating intermediate objects
/// as needed. Used when building error events from configured field paths.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) {
    let mut cur = value;
    let parts: Vec<&str> = path.split('.').collect();
    for key in &parts[..parts.len() - 1] {
        if !cur.is_object() {
            *cur = Value::Object(serde_json::Map::new());
        }
        cur = cur
            .as_object_mut()
            .unwrap()
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    if !cur.is_object() {
        *cur = Value::Object(serde_json::Map::new());
    }
    cur.as_object_mut()
        .unwrap()
        .insert(parts[parts.len() - 1].to_string(), new_value);
}

/// Turns an arbitrary string (typically a schema title or URI) into a safe
/// Kafka-style topic/stream name component: disallowed characters become
/// `_`, leading underscores are stripped, and the result always matches
/// `^[A-Za-z0-9][A-Za-z0-9_.-]*$`.
///
/// Idempotent: `sanitize_stream_name(sanitize_stream_name(x)) ==
/// sanitize_stream_name(x)`.
pub fn sanitize_stream_name(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_start_matches('_');
    match trimmed.chars().next() {
        Some(c) if c.is_ascii_alphanumeric() => trimmed.to_string(),
        Some(_) => format!("s{trimmed}"),
        None => "s".to_string(),
    }
}
