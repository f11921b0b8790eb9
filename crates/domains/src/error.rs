//! # DomainError
//!
//! Centralized error handling for the Canopy workspace.
//! Every core operation returns one of these kinds; the HTTP layer owns the
//! mapping to status codes.

use thiserror::Error;

/// The closed set of failures a core operation can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Content is absent or not viewable; the caller can't tell which.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed caller input (missing hash, unparseable field, bad key)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Session store is full; the user may retry later
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Login failed. Unknown user and wrong password look the same.
    #[error("invalid username or password")]
    Unauthorized,

    /// Infrastructure failure (SQL, filesystem, image codec)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Wraps any displayable infrastructure error as `Internal`.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A specialized Result type for Canopy logic.
pub type Result<T> = std::result::Result<T, DomainError>;
