//! Condor Bus
//!
//! Message bus client for the condor launcher.
//!
//! The launcher consumes job requests and publishes job status updates. This
//! crate hides the broker behind two traits so the dispatch loop and the
//! held-job reaper never depend on a concrete transport:
//! - [`JobConsumer`]: receive deliveries and acknowledge them
//! - [`StatusPublisher`]: publish messages, with a helper for status updates
//!
//! Two implementations ship with the crate: [`ZmqBus`] talks to a ZeroMQ
//! forwarding broker, [`MemoryBus`] keeps everything in process for tests and
//! local runs.
//!
//! # Example
//!
//! ```no_run
//! use condor_bus::{JobConsumer, ZmqBus, topics};
//!
//! #[tokio::main]
//! async fn main() -> condor_bus::Result<()> {
//!     let bus = ZmqBus::connect(
//!         "tcp://127.0.0.1:5556",
//!         "tcp://127.0.0.1:5555",
//!         &[topics::LAUNCHES],
//!     )
//!     .await?;
//!
//!     while let Some(delivery) = bus.recv().await? {
//!         bus.ack(&delivery).await?;
//!         println!("{} bytes on {}", delivery.body.len(), delivery.topic);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod memory;
pub mod topics;
mod zmq;

pub use error::{BusError, Result};
pub use memory::MemoryBus;
pub use zmq::ZmqBus;

use async_trait::async_trait;
use condor_core::domain::status::StatusUpdate;
use std::sync::Arc;

/// A message received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-assigned tag used to acknowledge this delivery
    pub tag: u64,
    /// Topic (routing key) the message was published with
    pub topic: String,
    /// Raw message body (JSON)
    pub body: Vec<u8>,
}

/// Receives deliveries from the broker
#[async_trait]
pub trait JobConsumer: Send + Sync {
    /// Waits for the next delivery.
    ///
    /// Returns `None` once the consumer is closed and no more deliveries
    /// will arrive.
    async fn recv(&self) -> Result<Option<Delivery>>;

    /// Acknowledges a delivery so the broker won't redeliver it
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}

/// Publishes messages to the broker
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    /// Publishes a raw body on a topic
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()>;

    /// Publishes a job status update on the updates topic
    async fn publish_job_update(&self, update: &StatusUpdate) -> Result<()> {
        let body = serde_json::to_vec(update)?;
        self.publish(topics::UPDATES, body).await
    }
}

/// Blanket implementation so `Arc<dyn StatusPublisher>` can be used directly.
#[async_trait]
impl<T: StatusPublisher + ?Sized> StatusPublisher for Arc<T> {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        (**self).publish(topic, body).await
    }
}
