use std::sync::Arc;

use postal_common::DomainPredicate;
use serde::Deserialize;

use crate::{MemoryOutbox, SqliteOutbox, r#trait::OutboxStore};

/// Configuration for the outbox storage
///
/// The variant is the storage driver; its fields are the connection
/// settings for that driver.
///
/// # Examples
///
/// SQLite outbox in RON config:
/// ```ron
/// Postal (
///     storage: Sqlite(
///         connection: "/var/lib/postal/outbox.db",
///     ),
/// )
/// ```
///
/// Memory outbox for development:
/// ```ron
/// Postal (
///     storage: Memory,
/// )
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum StoreConfig {
    /// SQLite database file
    Sqlite {
        /// Path of the database file
        connection: String,
    },
    /// Process-local outbox, empty at startup
    Memory,
}

impl StoreConfig {
    /// Name of the configured driver, as used in logs.
    #[must_use]
    pub const fn driver(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => "sqlite",
            Self::Memory => "memory",
        }
    }

    /// Connection string for drivers that have one.
    #[must_use]
    pub fn connection(&self) -> Option<&str> {
        match self {
            Self::Sqlite { connection } => Some(connection),
            Self::Memory => None,
        }
    }

    /// Opens the configured store, creating the schema where the driver
    /// supports it.
    ///
    /// # Errors
    /// If the store cannot be opened or initialised
    pub async fn into_store(
        self,
        predicate: DomainPredicate,
    ) -> crate::Result<Arc<dyn OutboxStore>> {
        match self {
            Self::Sqlite { connection } => {
                let store = SqliteOutbox::new(connection, predicate);
                store.init().await?;
                Ok(Arc::new(store))
            }
            Self::Memory => Ok(Arc::new(MemoryOutbox::new(predicate))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sqlite_config() {
        let config: StoreConfig =
            ron::from_str(r#"Sqlite(connection: "/tmp/outbox.db")"#).unwrap();

        assert_eq!(config.driver(), "sqlite");
        assert_eq!(config.connection(), Some("/tmp/outbox.db"));
    }

    #[test]
    fn test_parse_memory_config() {
        let config: StoreConfig = ron::from_str("Memory").unwrap();

        assert_eq!(config, StoreConfig::Memory);
        assert_eq!(config.connection(), None);
    }

    #[tokio::test]
    async fn test_sqlite_store_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.db");
        let config = StoreConfig::Sqlite {
            connection: path.display().to_string(),
        };

        let store = config
            .into_store(DomainPredicate::new("local.test"))
            .await
            .unwrap();

        let batch = store
            .fetch_batch(postal_common::Lane::Local, 10)
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert!(path.exists());
    }
}
