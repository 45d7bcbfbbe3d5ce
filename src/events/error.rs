use serde::Serialize;

/// A single JSON Schema validation failure, in the shape produced by the
/// `jsonschema` crate's error iterator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub data_path: String,
    pub message: String,
}

/// Taxonomy of everything that can go wrong while processing one event.
///
/// Every variant is mapped to a bucket (`success` is implicit — there is no
/// error in that case) by [`EventGateError::classify`]. The mapping, not the
/// variant name, is what the response body and the background re-submission
/// loop act on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventGateError {
    #[error("event is missing a required field; tried paths {paths:?}")]
    MissingField { paths: Vec<String> },

    #[error("event does not declare a schema reference")]
    SchemaRefMissing,

    #[error("failed to load schema {schema_ref}: {message}")]
    SchemaLoadFailure { schema_ref: String, message: String },

    #[error("event failed schema validation: {errors_text}")]
    ValidationFailure {
        issues: Vec<ValidationIssue>,
        errors_text: String,
    },

    #[error("stream {stream:?} is not authorized for this event's schema")]
    UnauthorizedStream { stream: String },

    #[error("producer rejected the event: {0}")]
    ProduceFailure(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// The three buckets an event can land in. Carried in the response body and
/// used to decide the overall HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Success,
    Invalid,
    Error,
}

impl EventGateError {
    /// Maps this error to the bucket its event belongs in.
    ///
    /// `SchemaLoadFailure`, `ProduceFailure` and `InternalError` are
    /// operational failures (the event itself may well be valid) and land in
    /// `error`; everything else reflects something wrong with the event
    /// itself and lands in `invalid`.
    pub fn classify(&self) -> StatusKind {
        match self {
            Self::MissingField { .. }
            | Self::SchemaRefMissing
            | Self::ValidationFailure { .. }
            | Self::UnauthorizedStream { .. } => StatusKind::Invalid,
            Self::SchemaLoadFailure { .. } | Self::ProduceFailure(_) | Self::InternalError(_) => {
                StatusKind::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failure_is_invalid() {
        let err = EventGateError::ValidationFailure {
            issues: vec![],
            errors_text: "bad".into(),
        };
        assert_eq!(err.classify(), StatusKind::Invalid);
    }

    #[test]
    fn schema_load_failure_is_error() {
        let err = EventGateError::SchemaLoadFailure {
            schema_ref: "x".into(),
            message: "boom".into(),
        };
        assert_eq!(err.classify(), StatusKind::Error);
    }

    #[test]
    fn unauthorized_stream_is_invalid() {
        let err = EventGateError::UnauthorizedStream {
            stream: "s".into(),
        };
        assert_eq!(err.classify(), StatusKind::Invalid);
    }
}
