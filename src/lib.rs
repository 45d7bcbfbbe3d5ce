//! EventGate: an HTTP event intake service.
//!
//! Producers POST JSON events; each event's declared schema is resolved,
//! compiled, and cached; the event is validated against it, its destination
//! stream is checked against a hot-reloadable authorization map, and valid
//! events are forwarded to a Kafka-style bus. Validation failures are mapped
//! to error events and re-submitted through the same pipeline in the
//! background.

pub mod config;
pub mod events;
pub mod gate;
pub mod producer;
pub mod routes;
pub mod streams;
pub mod validation;
