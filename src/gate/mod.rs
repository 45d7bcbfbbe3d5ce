//! The EventGate core: the single place that knows how to take one event
//! from "just arrived" to "produced, or filed as invalid/error", and how to
//! fan a batch out across the gate's worker pool while preserving each
//! event's position in its outcome bucket.

pub mod errormap;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::events::{
    extract_field, extract_str_field, sanitize_stream_name, Event, EventGateError, EventStatus,
    ProcessResult, StatusContext, StatusKind,
};
use crate::producer::{Dispatcher, ProduceRequest};
use crate::streams::StreamAuthorizer;
use crate::validation::ValidatorCache;

use errormap::{map_to_error_event, ErrorEventConfig};

/// Per-request knobs that don't belong in static config: the delivery mode
/// requested for this call, and an id for correlating logs and, if the
/// event ends up re-submitted as an error event, its `meta.request_id`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub hasty: bool,
    pub request_id: String,
}

pub struct GateConfig {
    pub schema_uri_field_paths: Vec<String>,
    pub stream_field_paths: Vec<String>,
    pub topic_prefix: String,
    pub error_event: Option<ErrorEventConfig>,
    pub background_deadline: Duration,
    /// Used only for log correlation, never to route or key the event.
    pub id_field_paths: Vec<String>,
    pub dt_field_paths: Vec<String>,
    pub key_field_paths: Vec<String>,
    pub partition_field_paths: Vec<String>,
}

struct Inner {
    validator_cache: Arc<ValidatorCache>,
    authorizer: Arc<StreamAuthorizer>,
    dispatcher: Arc<Dispatcher>,
    config: GateConfig,
    background_tasks: TaskTracker,
}

/// A cheap-to-clone handle onto the gate; every clone shares the same
/// caches, authorizer, dispatcher and background-task tracker.
#[derive(Clone)]
pub struct EventGate {
    inner: Arc<Inner>,
}

impl EventGate {
    pub fn new(
        validator_cache: Arc<ValidatorCache>,
        authorizer: Arc<StreamAuthorizer>,
        dispatcher: Arc<Dispatcher>,
        config: GateConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                validator_cache,
                authorizer,
                dispatcher,
                config,
                background_tasks: TaskTracker::new(),
            }),
        }
    }

    /// Re-fetches the stream-authorization config and drops every cached
    /// compiled validator, so the next event for each ref recompiles. Called
    /// on SIGHUP or by an embedder that wants to force a reload.
    pub async fn reload(&self) -> Result<(), EventGateError> {
        info!("reloading stream config and clearing validator cache");
        self.inner.authorizer.reload().await?;
        self.inner.validator_cache.clear();
        Ok(())
    }

    /// Waits for every currently in-flight background re-submission task to
    /// finish. Used during graceful shutdown.
    pub async fn wait_for_background_tasks(&self) {
        self.inner.background_tasks.close();
        self.inner.background_tasks.wait().await;
    }

    /// Processes every event in `events` concurrently, preserving each
    /// event's position within its outcome bucket. If any event landed in
    /// `invalid` or `error`, spawns a detached background task that maps the
    /// validation failures to error events and re-submits them.
    pub async fn process(&self, events: Vec<Event>, ctx: RequestContext) -> ProcessResult {
        let ctx = Arc::new(ctx);
        let handles: Vec<_> = events
            .into_iter()
            .map(|event| {
                let this = self.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move { this.process_one(event, &ctx).await })
            })
            .collect();

        let mut result = ProcessResult::default();
        let mut failures: Vec<EventStatus> = Vec::new();
        for handle in handles {
            let status = match handle.await {
                Ok(status) => status,
                Err(join_err) => EventStatus {
                    status: StatusKind::Error,
                    event: Value::Null,
                    context: StatusContext::Message {
                        message: format!("processing task failed: {join_err}"),
                    },
                },
            };
            if status.status != StatusKind::Success {
                failures.push(status.clone());
            }
            result.push(status);
        }

        if !failures.is_empty() {
            self.spawn_error_resubmission(failures, ctx.request_id.clone());
        }

        result
    }

    async fn process_one(&self, mut event: Event, ctx: &RequestContext) -> EventStatus {
        let event_id = extract_str_field(&event, &self.inner.config.id_field_paths).ok();

        match self.validate_and_produce(&mut event, ctx).await {
            Ok(ack) => {
                debug!(?event_id, "event produced");
                EventStatus {
                    status: StatusKind::Success,
                    event,
                    context: StatusContext::Ack(ack),
                }
            }
            Err(error) => {
                let status = error.classify();
                debug!(?status, %error, ?event_id, "event rejected");
                EventStatus {
                    status,
                    event,
                    context: StatusContext::from_error(&error),
                }
            }
        }
    }

    async fn validate_and_produce(
        &self,
        event: &mut Event,
        ctx: &RequestContext,
    ) -> Result<crate::producer::ProduceAck, EventGateError> {
        let schema_ref = self.extract_schema_ref(event)?;
        let stream = self.extract_stream(event, &schema_ref)?;

        let schema = self.inner.validator_cache.schema_for(&schema_ref).await?;
        self.inner
            .authorizer
            .ensure_allowed(schema.title.as_deref(), &stream)?;

        self.inner
            .validator_cache
            .validate(&schema_ref, event)
            .await?;

        let topic = format!("{}{}", self.inner.config.topic_prefix, stream);
        let payload = serde_json::to_vec(event)
            .map_err(|e| EventGateError::InternalError(format!("failed to encode event: {e}")))?;

        let key = extract_str_field(event, &self.inner.config.key_field_paths).ok();
        let partition = extract_field(event, &self.inner.config.partition_field_paths)
            .ok()
            .and_then(|v| v.as_i64())
            .and_then(|v| i32::try_from(v).ok());
        let timestamp = extract_str_field(event, &self.inner.config.dt_field_paths)
            .ok()
            .and_then(|v| chrono::DateTime::parse_from_rfc3339(&v).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        let request = ProduceRequest {
            topic,
            key,
            partition,
            timestamp,
            payload,
        };

        self.inner
            .dispatcher
            .dispatch(ctx.hasty, request)
            .await
            .map_err(|e| EventGateError::ProduceFailure(e.to_string()))
    }

    fn extract_schema_ref(&self, event: &Value) -> Result<String, EventGateError> {
        extract_str_field(event, &self.inner.config.schema_uri_field_paths)
            .map_err(|_| EventGateError::SchemaRefMissing)
    }

    fn extract_stream(&self, event: &Value, schema_ref: &str) -> Result<String, EventGateError> {
        if self.inner.config.stream_field_paths.is_empty() {
            return Ok(sanitize_stream_name(schema_ref));
        }
        extract_str_field(event, &self.inner.config.stream_field_paths)
    }

    /// Maps each failure to an error event and re-submits it through
    /// `process_one` directly (not through `process`, so a failure in the
    /// error event itself is only logged, never re-mapped again). Detached:
    /// the caller's request has already returned by the time this runs.
    fn spawn_error_resubmission(&self, failures: Vec<EventStatus>, request_id: String) {
        let Some(error_config) = self.inner.config.error_event.clone() else {
            return;
        };
        let this = self.clone();
        let deadline = self.inner.config.background_deadline;

        self.inner.background_tasks.spawn(async move {
            for failure in failures {
                if !matches!(failure.context, StatusContext::Validation { .. }) {
                    continue;
                }

                let Some(error_event) = map_to_error_event(
                    &failure_to_error(&failure),
                    &failure.event,
                    &request_id,
                    &error_config,
                ) else {
                    continue;
                };

                let ctx = RequestContext {
                    hasty: false,
                    request_id: request_id.clone(),
                };
                match tokio::time::timeout(deadline, this.process_one(error_event, &ctx)).await {
                    Ok(status) if status.status == StatusKind::Success => {
                        debug!("error event re-submitted successfully");
                    }
                    Ok(status) => {
                        let kind = status.status;
                        warn!(?kind, "error event re-submission did not succeed");
                    }
                    Err(_) => {
                        warn!("error event re-submission timed out");
                    }
                }
            }
        });
    }
}

/// Recovers an `EventGateError::ValidationFailure` from an `EventStatus`'s
/// context, for handing to `map_to_error_event`. `errormap` only acts on
/// validation failures, so this is lossless for the cases that matter.
fn failure_to_error(status: &EventStatus) -> EventGateError {
    match &status.context {
        StatusContext::Validation { errors } => EventGateError::ValidationFailure {
            issues: errors.clone(),
            errors_text: errors
                .iter()
                .map(|e| format!("{}: {}", e.data_path, e.message))
                .collect::<Vec<_>>()
                .join("; "),
        },
        StatusContext::Message { message } => EventGateError::InternalError(message.clone()),
        StatusContext::Ack(_) => unreachable!("only failures are passed to failure_to_error"),
    }
}
