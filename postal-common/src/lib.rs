pub mod config;
pub mod lane;
pub mod logging;
pub mod message;

pub use tracing;

pub use lane::{DomainPredicate, Lane, LaneState};
pub use message::{DeliveryRecord, DeliveryStatus, LetterId, QueuedMessage};

/// Process-wide control signal broadcast to every running lane.
///
/// Each lane holds its own receiver, so a single send reaches all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
