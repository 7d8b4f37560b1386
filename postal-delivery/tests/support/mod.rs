#![allow(dead_code)]

pub mod mock_server;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use postal_common::{
    DeliveryRecord, DeliveryStatus, DomainPredicate, Lane, LetterId, QueuedMessage,
};
use postal_delivery::{
    DeliveryError, LaneResources, MessageRenderer, RenderedEmail, Transport,
};
use postal_outbox::{MemoryOutbox, OutboxStore, StoreError};

pub const LOCAL_DOMAIN: &str = "local.test";

/// Generous upper bound for waits under paused time.
pub const WAIT: Duration = Duration::from_secs(3600);

pub fn message(id: i64, recipients: &str) -> QueuedMessage {
    QueuedMessage::from_columns(
        id,
        "noreply@local.test",
        recipients,
        None,
        format!("Message {id}"),
        "Hello",
    )
}

pub fn outbox(messages: impl IntoIterator<Item = QueuedMessage>) -> MemoryOutbox {
    let outbox = MemoryOutbox::new(DomainPredicate::new(LOCAL_DOMAIN));
    for message in messages {
        outbox.enqueue(message).unwrap();
    }
    outbox
}

pub fn resources(store: Arc<dyn OutboxStore>, transport: Arc<dyn Transport>) -> LaneResources {
    LaneResources {
        store,
        transport,
        renderer: MessageRenderer::default(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub sender: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub wire: String,
}

/// Transport that accepts everything except messages addressed to an
/// unreachable recipient, which fail as if the relay could not be dialled.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    unreachable: HashSet<String>,
}

impl RecordingTransport {
    pub fn unreachable_for(recipients: &[&str]) -> Self {
        Self {
            sent: Mutex::default(),
            unreachable: recipients.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        email: &RenderedEmail,
        sender: &str,
        recipients: &[String],
        cc: &[String],
    ) -> Result<(), DeliveryError> {
        if recipients.iter().any(|r| self.unreachable.contains(r)) {
            return Err(DeliveryError::Dial {
                address: "relay.test:25".to_string(),
                reason: "Connection refused".to_string(),
            });
        }

        self.sent.lock().unwrap().push(SentMessage {
            sender: sender.to_string(),
            recipients: recipients.to_vec(),
            cc: cc.to_vec(),
            wire: email.to_wire(),
        });
        Ok(())
    }
}

/// Outbox whose storage fails on demand.
#[derive(Debug)]
pub struct FaultyStore {
    pub inner: MemoryOutbox,
    pub failing_fetch: Option<Lane>,
    pub failing_record: bool,
}

#[async_trait]
impl OutboxStore for FaultyStore {
    async fn fetch_batch(
        &self,
        lane: Lane,
        limit: usize,
    ) -> postal_outbox::Result<Vec<QueuedMessage>> {
        if self.failing_fetch == Some(lane) {
            return Err(StoreError::Connection("database is locked".to_string()));
        }
        self.inner.fetch_batch(lane, limit).await
    }

    async fn record_delivery(
        &self,
        message_id: LetterId,
        status: &DeliveryStatus,
    ) -> postal_outbox::Result<DeliveryRecord> {
        if self.failing_record {
            return Err(StoreError::Write("disk I/O error".to_string()));
        }
        self.inner.record_delivery(message_id, status).await
    }
}
