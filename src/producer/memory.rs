//! An in-memory `Producer` used by tests and by `eventgate serve` when no
//! real broker is configured, mirroring the teacher's test-double providers.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use super::{ProduceAck, ProduceRequest, Producer, ProducerError};

pub struct InMemoryProducer {
    records: Mutex<Vec<ProduceRequest>>,
    next_offset: AtomicI64,
    fail_after: Option<usize>,
}

impl InMemoryProducer {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            next_offset: AtomicI64::new(0),
            fail_after: None,
        }
    }

    /// A producer that returns [`ProducerError::QueueFull`] once it has
    /// accepted `n` events, for exercising backpressure handling.
    pub fn failing_after(n: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            next_offset: AtomicI64::new(0),
            fail_after: Some(n),
        }
    }

    pub fn produced(&self) -> Vec<ProduceRequest> {
        self.records.lock().unwrap().clone()
    }
}

impl Default for InMemoryProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for InMemoryProducer {
    async fn produce(&self, request: ProduceRequest) -> Result<ProduceAck, ProducerError> {
        let mut records = self.records.lock().unwrap();
        if let Some(limit) = self.fail_after {
            if records.len() >= limit {
                return Err(ProducerError::QueueFull);
            }
        }
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let ack = ProduceAck {
            topic: request.topic.clone(),
            partition: request.partition.unwrap_or(0),
            offset,
        };
        records.push(request);
        Ok(ack)
    }
}
