//! # Ports
//!
//! Adapters implement these traits; services only ever see the traits.

use crate::error::Result;
use crate::query::Query;
use crate::row::SqlRow;
use async_trait::async_trait;

/// A transactional SQL engine. Implementations must call `Query::check`
/// before running a statement and map every driver failure to
/// `DomainError::Internal`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Zero or one row. More than one row is not an error; the first wins.
    async fn fetch_optional(&self, query: &Query) -> Result<Option<SqlRow>>;

    async fn fetch_all(&self, query: &Query) -> Result<Vec<SqlRow>>;

    /// First column of the first row as an integer (`COUNT(*)` and friends).
    async fn fetch_scalar(&self, query: &Query) -> Result<i64>;
}

/// The password digest primitive: `digest(password, salt) -> bytes`.
/// Login succeeds iff the digest of the candidate equals the stored one.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait PasswordDigest: Send + Sync {
    fn digest(&self, password: &[u8], salt: &[u8]) -> Result<Vec<u8>>;
}
