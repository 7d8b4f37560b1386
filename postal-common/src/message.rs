//! Outbox data model.
//!
//! A [`QueuedMessage`] is one row of the outbox awaiting delivery. Once a
//! delivery attempt has been made, exactly one [`DeliveryRecord`] exists for
//! it and the message is never fetched again.

use core::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator used for address lists in outbox storage.
pub const ADDRESS_SEPARATOR: char = ';';

/// Identifier of an outbox row (`LetterID`).
///
/// Ordering follows the storage column, which is the delivery order within a
/// lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LetterId(pub i64);

impl Display for LetterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for LetterId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A message waiting in the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: LetterId,
    pub sender: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl QueuedMessage {
    /// Builds a message from its storage representation, splitting the
    /// semicolon-delimited address columns.
    pub fn from_columns(
        id: impl Into<LetterId>,
        sender: impl Into<String>,
        recipients: &str,
        cc: Option<&str>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            recipients: split_addresses(recipients),
            cc: cc.map(split_addresses).unwrap_or_default(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// The `To` column as stored: recipients joined by `;`.
    pub fn recipients_column(&self) -> String {
        join_addresses(&self.recipients)
    }

    /// The `CC` column as stored, empty when there are no Cc recipients.
    pub fn cc_column(&self) -> String {
        join_addresses(&self.cc)
    }

    /// Every envelope recipient: `recipients` first, then `cc`.
    pub fn envelope_recipients(&self) -> impl Iterator<Item = &str> {
        self.recipients
            .iter()
            .chain(self.cc.iter())
            .map(String::as_str)
    }
}

/// Splits a stored address list, dropping empty entries left by blank
/// columns or trailing separators.
pub fn split_addresses(raw: &str) -> Vec<String> {
    raw.split(ADDRESS_SEPARATOR)
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

pub fn join_addresses(addresses: &[String]) -> String {
    addresses.join(&ADDRESS_SEPARATOR.to_string())
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
}

impl DeliveryStatus {
    /// Value stored in the `ErrorMessage` column.
    pub const OK: &'static str = "ok";

    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// The status as persisted: `"ok"` or the error description.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Delivered => Self::OK,
            Self::Failed(reason) => reason,
        }
    }

    /// Reads a persisted status back.
    pub fn from_stored(value: &str) -> Self {
        if value == Self::OK {
            Self::Delivered
        } else {
            Self::Failed(value.to_owned())
        }
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub message_id: LetterId,
    pub sent_at: DateTime<Utc>,
    pub status: DeliveryStatus,
}

impl DeliveryRecord {
    pub fn now(message_id: LetterId, status: DeliveryStatus) -> Self {
        Self {
            message_id,
            sent_at: Utc::now(),
            status,
        }
    }
}
