use async_trait::async_trait;
use postal_common::{DeliveryRecord, DeliveryStatus, Lane, LetterId, QueuedMessage};

/// Access to the outbox and its delivery records.
///
/// Implementations partition the outbox between the two lanes with a
/// [`postal_common::DomainPredicate`]: for any state of the store, the
/// `Local` and `Outer` fetches return disjoint sets whose union is every
/// message without a delivery record.
#[async_trait]
pub trait OutboxStore: std::fmt::Debug + Send + Sync {
    /// Up to `limit` undelivered messages belonging to `lane`, in ascending
    /// id order.
    async fn fetch_batch(&self, lane: Lane, limit: usize) -> crate::Result<Vec<QueuedMessage>>;

    /// Appends the delivery record for `message_id`, stamped with the
    /// current time.
    ///
    /// Once this returns, `message_id` is never part of a later
    /// [`fetch_batch`](Self::fetch_batch) result.
    async fn record_delivery(
        &self,
        message_id: LetterId,
        status: &DeliveryStatus,
    ) -> crate::Result<DeliveryRecord>;
}
