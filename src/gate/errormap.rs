//! Turns a validation failure into an error event, suitable for
//! re-submission through the same pipeline that rejected the original.

use serde_json::{json, Value};

use crate::events::{set_path, EventGateError};

#[derive(Debug, Clone)]
pub struct ErrorEventConfig {
    pub schema_uri_field: String,
    pub stream_field: String,
    pub error_schema_uri: String,
    pub error_stream: String,
    pub emitter_id: String,
}

/// Builds an error event describing `error` against `original_event`, or
/// `None` if `error` isn't a validation failure — operational failures
/// (schema load, produce) aren't events the pipeline itself caused and
/// aren't re-submitted.
pub fn map_to_error_event(
    error: &EventGateError,
    original_event: &Value,
    request_id: &str,
    config: &ErrorEventConfig,
) -> Option<Value> {
    let EventGateError::ValidationFailure { errors_text, .. } = error else {
        return None;
    };

    let meta = original_event.get("meta");
    let uri = meta
        .and_then(|m| m.get("uri"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let domain = meta
        .and_then(|m| m.get("domain"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let mut payload = json!({
        "meta": {
            "id": uuid::Uuid::now_v7().to_string(),
            "dt": chrono::Utc::now().to_rfc3339(),
            "uri": uri,
            "domain": domain,
            "request_id": request_id,
        },
        "emitter_id": config.emitter_id,
        "raw_event": serde_json::to_string(original_event).unwrap_or_default(),
        "message": errors_text,
    });

    set_path(
        &mut payload,
        &config.schema_uri_field,
        json!(config.error_schema_uri),
    );
    set_path(&mut payload, &config.stream_field, json!(config.error_stream));

    Some(payload)
}
