use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::message::QueuedMessage;

/// One of the two dispatch lanes, partitioned by recipient domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Lane {
    /// Messages with at least one recipient in the local domain
    Local,
    /// Everything else
    Outer,
}

impl Lane {
    pub const ALL: [Self; 2] = [Self::Local, Self::Outer];

    pub const fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }

    pub const fn from_local(is_local: bool) -> Self {
        if is_local { Self::Local } else { Self::Outer }
    }
}

impl Display for Lane {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Outer => "outer",
        })
    }
}

/// Lifecycle of a dispatch lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaneState {
    #[default]
    Polling,
    Dispatching,
    Sleeping,
    Stopped,
}

impl Display for LaneState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Polling => "polling",
            Self::Dispatching => "dispatching",
            Self::Sleeping => "sleeping",
            Self::Stopped => "stopped",
        })
    }
}

/// Routes messages to a lane by looking for the local domain in the `To`
/// recipients.
///
/// A message is local when any of its `recipients` contains the domain as an
/// ASCII case-insensitive substring. Cc addresses are not inspected, so a
/// message whose only local address is a Cc goes to the outer lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPredicate {
    local_domain: String,
}

impl DomainPredicate {
    pub fn new(local_domain: impl AsRef<str>) -> Self {
        Self {
            local_domain: local_domain.as_ref().trim().to_ascii_lowercase(),
        }
    }

    /// The normalised (trimmed, lower-cased) domain this predicate matches.
    pub fn local_domain(&self) -> &str {
        &self.local_domain
    }

    pub fn is_local(&self, message: &QueuedMessage) -> bool {
        message
            .recipients
            .iter()
            .any(|recipient| recipient.to_ascii_lowercase().contains(&self.local_domain))
    }

    pub fn lane_for(&self, message: &QueuedMessage) -> Lane {
        Lane::from_local(self.is_local(message))
    }

    pub fn matches(&self, lane: Lane, message: &QueuedMessage) -> bool {
        self.lane_for(message) == lane
    }
}
