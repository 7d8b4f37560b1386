//! Typed error handling for dispatch.
//!
//! Failures are split by blast radius:
//! - [`DeliveryError`]: one message could not be delivered. Recorded as the
//!   message's status and never retried.
//! - [`LaneError`]: the lane cannot continue. Reported to the supervisor.
//! - [`SupervisorError`]: why a drain did not complete cleanly.

use postal_common::Lane;
use postal_outbox::StoreError;
use postal_smtp::ClientError;
use thiserror::Error;

/// Failure to deliver a single message.
///
/// The `Display` output is what ends up in the delivery record.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The relay could not be reached.
    #[error("dial error: {address}: {reason}")]
    Dial { address: String, reason: String },

    /// The relay answered the connection with a non-2xx greeting.
    #[error("greeting rejected: {0}")]
    Greeting(String),

    /// Both `EHLO` and `HELO` were refused.
    #[error("hello rejected: {0}")]
    Hello(String),

    /// `MAIL FROM` was refused.
    #[error("sender {sender} rejected: {reason}")]
    Sender { sender: String, reason: String },

    /// `RCPT TO` was refused for one address.
    #[error("recipient {recipient} rejected: {reason}")]
    Recipient { recipient: String, reason: String },

    /// `DATA` or the message content was refused.
    #[error("data rejected: {0}")]
    Data(String),

    /// The session broke down (I/O failure, malformed reply, early close).
    #[error("protocol error: {0}")]
    Protocol(#[from] ClientError),
}

impl DeliveryError {
    /// Returns `true` if the relay explicitly refused part of the transaction,
    /// as opposed to the session failing.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Greeting(_)
                | Self::Hello(_)
                | Self::Sender { .. }
                | Self::Recipient { .. }
                | Self::Data(_)
        )
    }
}

/// Condition that stops a lane.
#[derive(Debug, Error)]
pub enum LaneError {
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Why [`crate::LaneSupervisor::await_drain`] did not return cleanly.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A lane stopped on a fatal error; the other lane was drained.
    #[error("{lane} lane stopped: {source}")]
    Lane {
        lane: Lane,
        #[source]
        source: LaneError,
    },

    /// A lane task ended without reporting, e.g. it panicked.
    #[error("{0} lane exited without reporting")]
    Lost(Lane),

    #[error("Lanes have not been started")]
    NotStarted,
}
