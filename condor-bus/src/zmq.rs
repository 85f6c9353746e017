//! ZeroMQ transport
//!
//! The launcher sits behind a ZeroMQ forwarding broker: it connects a SUB
//! socket to the broker backend for inbound requests and a PUB socket to the
//! broker frontend for outbound updates. Messages are two frames,
//! `[topic, JSON body]`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::{BusError, Result};
use crate::{Delivery, JobConsumer, StatusPublisher};

/// Bus client backed by a pair of ZeroMQ sockets
pub struct ZmqBus {
    subscriber: Mutex<SubSocket>,
    publisher: Mutex<PubSocket>,
    next_tag: AtomicU64,
}

impl ZmqBus {
    /// Connects to the broker and subscribes to the given topics
    ///
    /// # Arguments
    /// * `subscribe_endpoint` - Broker backend, where its PUB socket binds
    /// * `publish_endpoint` - Broker frontend, where its SUB socket binds
    /// * `topics` - Topic prefixes to receive
    #[instrument(skip_all, fields(sub = %subscribe_endpoint, publ = %publish_endpoint))]
    pub async fn connect(
        subscribe_endpoint: &str,
        publish_endpoint: &str,
        topics: &[&str],
    ) -> Result<Self> {
        let mut subscriber = SubSocket::new();
        info!(endpoint = %subscribe_endpoint, "connecting SUB socket to broker backend");
        subscriber.connect(subscribe_endpoint).await?;
        for topic in topics {
            subscriber.subscribe(topic).await?;
            info!(topic = %topic, "subscribed to topic");
        }

        let mut publisher = PubSocket::new();
        info!(endpoint = %publish_endpoint, "connecting PUB socket to broker frontend");
        publisher.connect(publish_endpoint).await?;

        Ok(Self {
            subscriber: Mutex::new(subscriber),
            publisher: Mutex::new(publisher),
            next_tag: AtomicU64::new(1),
        })
    }
}

/// Splits a received message into its topic and body frames
fn split_frames(msg: &ZmqMessage) -> Result<(String, Vec<u8>)> {
    let frames: Vec<_> = msg.iter().collect();
    match frames.as_slice() {
        [topic, body, ..] => Ok((
            String::from_utf8_lossy(topic.as_ref()).into_owned(),
            body.to_vec(),
        )),
        [_] => Err(BusError::Transport("message has no body frame".into())),
        [] => Err(BusError::Transport("empty ZMQ message".into())),
    }
}

#[async_trait]
impl JobConsumer for ZmqBus {
    /// Malformed messages are logged and skipped.
    async fn recv(&self) -> Result<Option<Delivery>> {
        let mut socket = self.subscriber.lock().await;
        loop {
            let msg = socket.recv().await?;
            match split_frames(&msg) {
                Ok((topic, body)) => {
                    let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
                    debug!(topic = %topic, tag, "received message");
                    return Ok(Some(Delivery { tag, topic, body }));
                }
                Err(e) => warn!(error = %e, "dropping malformed message"),
            }
        }
    }

    /// PUB/SUB has no broker-side acknowledgment; a received message is
    /// already consumed.
    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        debug!(tag = delivery.tag, "acknowledged delivery");
        Ok(())
    }
}

#[async_trait]
impl StatusPublisher for ZmqBus {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        let mut msg = ZmqMessage::from(topic);
        msg.push_back(body.into());

        let mut socket = self.publisher.lock().await;
        socket.send(msg).await?;

        debug!(topic = %topic, "published message");
        Ok(())
    }
}
