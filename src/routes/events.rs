use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::events::ProcessResult;
use crate::gate::RequestContext;

use super::AppState;
use crate::events::EventBatch;

#[derive(Debug, Deserialize)]
pub struct SubmitQuery {
    #[serde(default)]
    pub hasty: bool,
}

/// `POST /v1/events`. Accepts a single event object or a JSON array of
/// them. Response status follows the outcome:
///
/// - all events succeeded: `204 No Content`
/// - a mix of outcomes: `207 Multi-Status` with the per-event breakdown
///   (or `400` instead, if the server is configured `strict` and any event
///   was invalid)
/// - every event failed: `400 Bad Request`
///
/// `?hasty` asks for local-enqueue acknowledgement rather than waiting on
/// the broker; it otherwise follows the same status-code rules.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubmitQuery>,
    Json(batch): Json<EventBatch>,
) -> Response {
    let events = batch.into_vec();
    if events.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }

    let ctx = RequestContext {
        hasty: query.hasty,
        request_id: Uuid::new_v4().to_string(),
    };

    let result = state.gate.process(events, ctx).await;
    response_for(&result, state.strict)
}

fn response_for(result: &ProcessResult, strict: bool) -> Response {
    let any_invalid = !result.invalid.is_empty();
    let any_error = !result.error.is_empty();

    if !any_invalid && !any_error {
        return StatusCode::NO_CONTENT.into_response();
    }

    if result.success.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(result_body(result))).into_response();
    }

    if strict && any_invalid {
        return (StatusCode::BAD_REQUEST, Json(result_body(result))).into_response();
    }

    (
        StatusCode::from_u16(207).unwrap(),
        Json(result_body(result)),
    )
        .into_response()
}

fn result_body(result: &ProcessResult) -> serde_json::Value {
    serde_json::json!({
        "success": result.success,
        "invalid": result.invalid,
        "error": result.error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventStatus, StatusContext, StatusKind};
    use serde_json::json;

    fn status(kind: StatusKind) -> EventStatus {
        EventStatus {
            status: kind,
            event: json!({}),
            context: StatusContext::Message {
                message: "x".into(),
            },
        }
    }

    #[test]
    fn all_success_is_204() {
        let mut result = ProcessResult::default();
        result.push(status(StatusKind::Success));
        assert_eq!(response_for(&result, false).status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn mixed_is_207() {
        let mut result = ProcessResult::default();
        result.push(status(StatusKind::Success));
        result.push(status(StatusKind::Invalid));
        assert_eq!(response_for(&result, false).status().as_u16(), 207);
    }

    #[test]
    fn all_failed_is_400() {
        let mut result = ProcessResult::default();
        result.push(status(StatusKind::Invalid));
        assert_eq!(response_for(&result, false).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn strict_mode_rejects_any_invalid() {
        let mut result = ProcessResult::default();
        result.push(status(StatusKind::Success));
        result.push(status(StatusKind::Invalid));
        assert_eq!(response_for(&result, true).status(), StatusCode::BAD_REQUEST);
    }
}
