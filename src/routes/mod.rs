//! The HTTP surface: one real endpoint (`POST /v1/events`) plus the small
//! set of discovery/ops endpoints a service like this always carries.

mod events;
mod info;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::gate::EventGate;

#[derive(Clone)]
pub struct AppState {
    pub gate: EventGate,
    pub strict: bool,
}

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(info::root))
        .route("/v1/events", post(events::submit))
        .route("/_info", get(info::info))
        .route("/_info/name", get(info::name))
        .route("/_info/version", get(info::version))
        .route("/_info/home", get(info::home))
        .route("/robots.txt", get(info::robots))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
