use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use postal_common::{
    DeliveryRecord, DeliveryStatus, DomainPredicate, Lane, LetterId, QueuedMessage,
};
use tokio::sync::Notify;

use crate::{StoreError, r#trait::OutboxStore};

/// In-memory outbox
///
/// Messages and delivery records live in ordered maps behind `RwLock`s, so
/// fetches come back in id order without sorting. Primarily intended for
/// tests and local development; nothing survives a restart.
#[derive(Debug, Clone)]
pub struct MemoryOutbox {
    predicate: DomainPredicate,
    letters: Arc<RwLock<BTreeMap<LetterId, QueuedMessage>>>,
    records: Arc<RwLock<BTreeMap<LetterId, DeliveryRecord>>>,
    recorded: Arc<Notify>,
}

impl MemoryOutbox {
    #[must_use]
    pub fn new(predicate: DomainPredicate) -> Self {
        Self {
            predicate,
            letters: Arc::new(RwLock::new(BTreeMap::new())),
            records: Arc::new(RwLock::new(BTreeMap::new())),
            recorded: Arc::new(Notify::new()),
        }
    }

    /// Adds a message to the outbox, replacing any message with the same id.
    ///
    /// # Errors
    /// If the outbox lock is poisoned
    pub fn enqueue(&self, message: QueuedMessage) -> crate::Result<()> {
        self.letters.write()?.insert(message.id, message);
        Ok(())
    }

    /// All delivery records, in id order.
    ///
    /// # Errors
    /// If the record lock is poisoned
    pub fn records(&self) -> crate::Result<Vec<DeliveryRecord>> {
        Ok(self.records.read()?.values().cloned().collect())
    }

    /// # Errors
    /// If the record lock is poisoned
    pub fn record(&self, id: LetterId) -> crate::Result<Option<DeliveryRecord>> {
        Ok(self.records.read()?.get(&id).cloned())
    }

    /// Number of messages that have no delivery record yet.
    ///
    /// # Errors
    /// If either lock is poisoned
    pub fn pending(&self) -> crate::Result<usize> {
        let records = self.records.read()?;
        Ok(self
            .letters
            .read()?
            .keys()
            .filter(|id| !records.contains_key(id))
            .count())
    }

    /// Waits until at least `expected` delivery records exist.
    ///
    /// # Errors
    /// Returns an error if the timeout is reached first
    pub async fn wait_for_records(&self, expected: usize, timeout: Duration) -> crate::Result<()> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.recorded.notified();
                if self.records.read().map_or(0, |records| records.len()) >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
        .map_err(|e| StoreError::Internal(format!("Timeout waiting for delivery records: {e}")))
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn fetch_batch(&self, lane: Lane, limit: usize) -> crate::Result<Vec<QueuedMessage>> {
        let records = self.records.read()?;

        Ok(self
            .letters
            .read()?
            .values()
            .filter(|message| !records.contains_key(&message.id))
            .filter(|message| self.predicate.matches(lane, message))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn record_delivery(
        &self,
        message_id: LetterId,
        status: &DeliveryStatus,
    ) -> crate::Result<DeliveryRecord> {
        let record = DeliveryRecord::now(message_id, status.clone());

        {
            let mut records = self.records.write()?;
            if records.contains_key(&message_id) {
                return Err(StoreError::AlreadyRecorded(message_id));
            }
            records.insert(message_id, record.clone());
        }

        self.recorded.notify_waiters();
        Ok(record)
    }
}
