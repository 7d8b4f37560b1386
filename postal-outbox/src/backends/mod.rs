mod memory;
mod sqlite;

pub use memory::MemoryOutbox;
pub use sqlite::SqliteOutbox;
