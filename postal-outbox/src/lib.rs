//! Storage for the outbox (`LETTERS_TO_SEND`) and the delivery records
//! (`SENDED_LETTERS`) that deduplicate it.
//!
//! The [`OutboxStore`] trait is the only thing the dispatch lanes see; the
//! concrete backend is picked at startup through [`StoreConfig`].

pub mod backends;
pub mod config;
pub mod error;
pub mod r#trait;

pub use backends::{MemoryOutbox, SqliteOutbox};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use r#trait::OutboxStore;
