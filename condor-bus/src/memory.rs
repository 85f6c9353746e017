//! In-process bus
//!
//! Used by tests and for running the launcher without a broker. Deliveries
//! are injected with [`MemoryBus::push`]; everything published is recorded
//! and can be inspected afterwards.

use async_trait::async_trait;
use condor_core::domain::status::StatusUpdate;
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::error::{BusError, Result};
use crate::{Delivery, JobConsumer, StatusPublisher, topics};

/// Bus that lives entirely in memory
pub struct MemoryBus {
    sender: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
    next_tag: AtomicU64,
    acked: Mutex<Vec<u64>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryBus {
    /// Creates an empty bus
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            next_tag: AtomicU64::new(1),
            acked: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Queues a raw body for delivery on a topic
    ///
    /// # Returns
    /// The tag assigned to the delivery
    pub fn push(&self, topic: &str, body: Vec<u8>) -> Result<u64> {
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        let sender = self.sender.lock().unwrap();
        let sender = sender.as_ref().ok_or(BusError::Closed)?;
        sender
            .send(Delivery {
                tag,
                topic: topic.to_string(),
                body,
            })
            .map_err(|_| BusError::Closed)?;
        Ok(tag)
    }

    /// Serializes a value as JSON and queues it for delivery
    pub fn push_json<T: Serialize>(&self, topic: &str, value: &T) -> Result<u64> {
        self.push(topic, serde_json::to_vec(value)?)
    }

    /// Stops accepting new deliveries; `recv` returns `None` once drained
    pub fn close(&self) {
        self.sender.lock().unwrap().take();
    }

    /// Tags acknowledged so far, in order
    pub fn acked(&self) -> Vec<u64> {
        self.acked.lock().unwrap().clone()
    }

    /// Everything published so far, as `(topic, body)` pairs
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    /// Status updates published on the updates topic, decoded
    pub fn published_updates(&self) -> Vec<StatusUpdate> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(topic, _)| topic == topics::UPDATES)
            .filter_map(|(_, body)| serde_json::from_slice(body).ok())
            .collect()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobConsumer for MemoryBus {
    async fn recv(&self) -> Result<Option<Delivery>> {
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.recv().await)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.acked.lock().unwrap().push(delivery.tag);
        Ok(())
    }
}

#[async_trait]
impl StatusPublisher for MemoryBus {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), body));
        Ok(())
    }
}
