use axum::extract::{RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use super::AppState;

const NAME: &str = "eventgate";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const HOME: &str = "https://github.com/eventgate-rs/eventgate";

/// `GET /`. Serves a minimal OpenAPI document when called as `GET /?spec`;
/// 404s otherwise (there's nothing else to serve at the root).
pub async fn root(RawQuery(query): RawQuery, State(_state): State<Arc<AppState>>) -> Response {
    let wants_spec = query
        .map(|q| q.split('&').any(|p| p == "spec"))
        .unwrap_or(false);
    if !wants_spec {
        return StatusCode::NOT_FOUND.into_response();
    }

    Json(openapi_document()).into_response()
}

pub async fn info() -> Response {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
        "home": HOME,
    }))
    .into_response()
}

pub async fn name() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        NAME,
    )
        .into_response()
}

pub async fn version() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        VERSION,
    )
        .into_response()
}

pub async fn home() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        HOME,
    )
        .into_response()
}

pub async fn robots() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "User-agent: *\nDisallow: /\n",
    )
        .into_response()
}

fn openapi_document() -> serde_json::Value {
    serde_json::json!({
        "openapi": "3.0.3",
        "info": {
            "title": NAME,
            "version": VERSION,
        },
        "paths": {
            "/v1/events": {
                "post": {
                    "summary": "Submit one or more events",
                    "parameters": [
                        {
                            "name": "hasty",
                            "in": "query",
                            "required": false,
                            "schema": { "type": "boolean" },
                        }
                    ],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": {
                                    "oneOf": [
                                        { "type": "object" },
                                        { "type": "array", "items": { "type": "object" } }
                                    ]
                                }
                            }
                        }
                    },
                    "responses": {
                        "204": { "description": "every event was accepted" },
                        "207": { "description": "a mix of accepted, invalid and errored events" },
                        "400": { "description": "every event was rejected" },
                    }
                }
            }
        }
    })
}
