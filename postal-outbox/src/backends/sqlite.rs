//! SQLite-backed outbox.
//!
//! Every operation opens its own connection on a blocking worker thread and
//! closes it when done; nothing is pooled. Queries are fully parameterised:
//! the local domain, the lane selector and the batch limit are bound values.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postal_common::{
    DeliveryRecord, DeliveryStatus, DomainPredicate, Lane, LetterId, QueuedMessage,
};
use rusqlite::{Connection, ErrorCode, OpenFlags, Row, params};

use crate::{StoreError, r#trait::OutboxStore};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS LETTERS_TO_SEND (
    LetterID INTEGER PRIMARY KEY,
    Sender   TEXT NOT NULL,
    Reciever TEXT NOT NULL,
    CC       TEXT,
    Subj     TEXT,
    Msg      TEXT
);

CREATE TABLE IF NOT EXISTS SENDED_LETTERS (
    LetterID     INTEGER PRIMARY KEY,
    Date_send    TEXT NOT NULL,
    ErrorMessage TEXT NOT NULL
);
";

/// `?1` local domain (lower-cased), `?2` 1 for the local lane and 0 for the
/// outer lane, `?3` batch limit.
const FETCH_BATCH: &str = r"
SELECT l.LetterID, l.Sender, l.Reciever, l.CC, l.Subj, l.Msg
  FROM LETTERS_TO_SEND l
 WHERE (instr(lower(coalesce(l.Reciever, '')), ?1) > 0) = ?2
   AND NOT EXISTS (SELECT 1 FROM SENDED_LETTERS s WHERE s.LetterID = l.LetterID)
 ORDER BY l.LetterID
 LIMIT ?3
";

const INSERT_RECORD: &str =
    "INSERT INTO SENDED_LETTERS (LetterID, Date_send, ErrorMessage) VALUES (?1, ?2, ?3)";

const INSERT_LETTER: &str = "INSERT INTO LETTERS_TO_SEND (LetterID, Sender, Reciever, CC, Subj, Msg) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const SELECT_RECORDS: &str =
    "SELECT LetterID, Date_send, ErrorMessage FROM SENDED_LETTERS ORDER BY LetterID";

/// Outbox stored in an SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteOutbox {
    path: PathBuf,
    predicate: DomainPredicate,
}

fn open(path: &Path) -> crate::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| StoreError::Connection(format!("{}: {e}", path.display())))
}

fn read_letter(row: &Row<'_>) -> rusqlite::Result<QueuedMessage> {
    let id: i64 = row.get(0)?;
    let sender: Option<String> = row.get(1)?;
    let recipients: Option<String> = row.get(2)?;
    let cc: Option<String> = row.get(3)?;
    let subject: Option<String> = row.get(4)?;
    let body: Option<String> = row.get(5)?;

    Ok(QueuedMessage::from_columns(
        id,
        sender.unwrap_or_default(),
        recipients.as_deref().unwrap_or_default(),
        cc.as_deref(),
        subject.unwrap_or_default(),
        body.unwrap_or_default(),
    ))
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<(i64, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

impl SqliteOutbox {
    /// `connection` is the path of the database file.
    #[must_use]
    pub fn new(connection: impl Into<PathBuf>, predicate: DomainPredicate) -> Self {
        Self {
            path: connection.into(),
            predicate,
        }
    }

    /// Runs `operation` against a freshly opened connection on the blocking
    /// thread pool.
    async fn with_connection<T, F>(&self, operation: F) -> crate::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> crate::Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let connection = open(&path)?;
            operation(&connection)
        })
        .await?
    }

    /// Creates the outbox and delivery-record tables when they are missing.
    ///
    /// # Errors
    /// If the database cannot be opened or the schema cannot be applied
    pub async fn init(&self) -> crate::Result<()> {
        self.with_connection(|connection| {
            connection
                .execute_batch(SCHEMA)
                .map_err(|e| StoreError::Query(format!("Unable to apply schema: {e}")))
        })
        .await
    }

    /// Inserts a message into the outbox.
    ///
    /// # Errors
    /// If the database cannot be opened or the row cannot be inserted
    pub async fn enqueue(&self, message: &QueuedMessage) -> crate::Result<()> {
        let message = message.clone();
        self.with_connection(move |connection| {
            let cc = (!message.cc.is_empty()).then(|| message.cc_column());
            connection
                .execute(
                    INSERT_LETTER,
                    params![
                        message.id.0,
                        message.sender,
                        message.recipients_column(),
                        cc,
                        message.subject,
                        message.body,
                    ],
                )
                .map(|_| ())
                .map_err(|e| StoreError::Write(format!("Unable to enqueue {}: {e}", message.id)))
        })
        .await
    }

    /// All delivery records, in id order.
    ///
    /// # Errors
    /// If the database cannot be read, or a stored timestamp is malformed
    pub async fn records(&self) -> crate::Result<Vec<DeliveryRecord>> {
        self.with_connection(|connection| {
            let mut statement = connection
                .prepare(SELECT_RECORDS)
                .map_err(|e| StoreError::Query(e.to_string()))?;

            let rows = statement
                .query_map([], read_record)
                .map_err(|e| StoreError::Query(e.to_string()))?;

            rows.map(|row| {
                let (id, sent_at, status) = row.map_err(|e| StoreError::Query(e.to_string()))?;
                let sent_at = DateTime::parse_from_rfc3339(&sent_at)
                    .map_err(|e| {
                        StoreError::Query(format!("Invalid Date_send for {id}: {e}"))
                    })?
                    .with_timezone(&Utc);

                Ok(DeliveryRecord {
                    message_id: LetterId(id),
                    sent_at,
                    status: DeliveryStatus::from_stored(&status),
                })
            })
            .collect()
        })
        .await
    }
}

#[async_trait]
impl OutboxStore for SqliteOutbox {
    async fn fetch_batch(&self, lane: Lane, limit: usize) -> crate::Result<Vec<QueuedMessage>> {
        let domain = self.predicate.local_domain().to_owned();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.with_connection(move |connection| {
            let mut statement = connection
                .prepare_cached(FETCH_BATCH)
                .map_err(|e| StoreError::Query(e.to_string()))?;

            let rows = statement
                .query_map(params![domain, lane.is_local(), limit], read_letter)
                .map_err(|e| StoreError::Query(e.to_string()))?;

            rows.map(|row| row.map_err(|e| StoreError::Query(e.to_string())))
                .collect()
        })
        .await
    }

    async fn record_delivery(
        &self,
        message_id: LetterId,
        status: &DeliveryStatus,
    ) -> crate::Result<DeliveryRecord> {
        let record = DeliveryRecord::now(message_id, status.clone());
        let row = record.clone();

        self.with_connection(move |connection| {
            connection
                .execute(
                    INSERT_RECORD,
                    params![row.message_id.0, row.sent_at.to_rfc3339(), row.status.as_str()],
                )
                .map_err(|e| {
                    if is_constraint_violation(&e) {
                        StoreError::AlreadyRecorded(row.message_id)
                    } else {
                        StoreError::Write(e.to_string())
                    }
                })
        })
        .await?;

        Ok(record)
    }
}
