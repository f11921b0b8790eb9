//! Storage adapters: the SQLite `SqlExecutor` and the on-disk thumbnail cache.

pub mod media;
#[cfg(feature = "db-sqlite")]
pub mod schema;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub use media::{ThumbnailCache, ThumbnailConfig, ThumbnailFile};
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteExecutor;
