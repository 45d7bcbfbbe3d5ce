//! The producer port: wraps whatever actually talks to the Kafka-style bus
//! behind a small trait, and dispatches each event to one of two configured
//! producers depending on whether the caller asked for the `hasty` (ack on
//! local enqueue) or guaranteed (ack on broker commit) delivery mode.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// What actually gets handed to the bus for one event.
#[derive(Debug, Clone)]
pub struct ProduceRequest {
    pub topic: String,
    pub key: Option<String>,
    pub partition: Option<i32>,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub payload: Vec<u8>,
}

/// Acknowledgement of a produced event, returned to the caller as part of a
/// successful [`crate::events::EventStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct ProduceAck {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProducerError {
    #[error("producer queue is full")]
    QueueFull,
    #[error("producer error: {0}")]
    Other(String),
}

/// A port onto a message bus. Implementations differ in how hard they try
/// to guarantee delivery before acknowledging, not in their API shape.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&self, request: ProduceRequest) -> Result<ProduceAck, ProducerError>;
}

/// Routes each event to the guaranteed or hasty producer based on the
/// request's `hasty` flag, falling back to the guaranteed producer when no
/// hasty producer is configured.
pub struct Dispatcher {
    guaranteed: Arc<dyn Producer>,
    hasty: Option<Arc<dyn Producer>>,
}

impl Dispatcher {
    pub fn new(guaranteed: Arc<dyn Producer>, hasty: Option<Arc<dyn Producer>>) -> Self {
        Self { guaranteed, hasty }
    }

    pub async fn dispatch(
        &self,
        hasty_requested: bool,
        request: ProduceRequest,
    ) -> Result<ProduceAck, ProducerError> {
        if hasty_requested {
            if let Some(producer) = &self.hasty {
                return producer.produce(request).await;
            }
        }
        self.guaranteed.produce(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryProducer;
    use super::*;

    #[tokio::test]
    async fn dispatch_without_hasty_producer_uses_guaranteed() {
        let guaranteed = Arc::new(InMemoryProducer::new());
        let dispatcher = Dispatcher::new(guaranteed.clone(), None);

        dispatcher
            .dispatch(
                true,
                ProduceRequest {
                    topic: "t".into(),
                    key: None,
                    partition: None,
                    timestamp: None,
                    payload: vec![1],
                },
            )
            .await
            .unwrap();

        assert_eq!(guaranteed.produced().len(), 1);
    }

    #[tokio::test]
    async fn hasty_request_routes_to_hasty_producer() {
        let guaranteed = Arc::new(InMemoryProducer::new());
        let hasty = Arc::new(InMemoryProducer::new());
        let dispatcher = Dispatcher::new(guaranteed.clone(), Some(hasty.clone()));

        dispatcher
            .dispatch(
                true,
                ProduceRequest {
                    topic: "t".into(),
                    key: None,
                    partition: None,
                    timestamp: None,
                    payload: vec![1],
                },
            )
            .await
            .unwrap();

        assert_eq!(guaranteed.produced().len(), 0);
        assert_eq!(hasty.produced().len(), 1);
    }

    #[tokio::test]
    async fn non_hasty_request_always_uses_guaranteed() {
        let guaranteed = Arc::new(InMemoryProducer::new());
        let hasty = Arc::new(InMemoryProducer::new());
        let dispatcher = Dispatcher::new(guaranteed.clone(), Some(hasty.clone()));

        dispatcher
            .dispatch(
                false,
                ProduceRequest {
                    topic: "t".into(),
                    key: None,
                    partition: None,
                    timestamp: None,
                    payload: vec![1],
                },
            )
            .await
            .unwrap();

        assert_eq!(guaranteed.produced().len(), 1);
        assert_eq!(hasty.produced().len(), 0);
    }
}
