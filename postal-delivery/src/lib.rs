//! Dual-lane dispatch of outbox messages.
//!
//! The outbox is split by recipient domain into a local and an outer lane.
//! Each [`DispatchLane`] polls its share on its own schedule, renders each
//! message with [`MessageRenderer`], hands it to a [`Transport`] and records
//! the outcome. The [`LaneSupervisor`] runs both lanes and coordinates their
//! shutdown.

pub mod error;
pub mod lane;
pub mod render;
pub mod supervisor;
pub mod transport;

pub use error::{DeliveryError, LaneError, SupervisorError};
pub use lane::{DispatchLane, LaneResources, LaneStats};
pub use render::{ContentType, ContentTypeDetection, MessageRenderer, RenderedEmail};
pub use supervisor::{DrainReport, LaneSupervisor, ShutdownHandle};
pub use transport::{SmtpSender, Transport};
