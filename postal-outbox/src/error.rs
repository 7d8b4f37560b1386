//! Error types for the postal-outbox crate.

use postal_common::LetterId;
use thiserror::Error;

/// Storage failure.
///
/// Every variant is fatal for the lane that hits it: the outbox can no
/// longer be trusted to deduplicate deliveries.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened or reached.
    #[error("Unable to connect to outbox storage: {0}")]
    Connection(String),

    /// Reading the outbox failed.
    #[error("Outbox query failed: {0}")]
    Query(String),

    /// A delivery record could not be committed.
    #[error("Failed to write delivery record: {0}")]
    Write(String),

    /// A delivery record already exists for this message.
    #[error("Delivery already recorded for message {0}")]
    AlreadyRecorded(LetterId),

    /// Internal error (lock poisoning, worker thread failure, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Storage worker failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
