//! The domain layer for Canopy: models, the error type, query composition
//! and the port traits adapters implement.

pub mod error;
pub mod models;
pub mod ports;
pub mod query;
pub mod row;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use ports::*;
pub use query::Query;
pub use row::{FromSqlRow, SqlRow, SqlValue};
