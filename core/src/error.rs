//! Error taxonomy for the Courtbook core.
//!
//! Domain failures (`Validation`, `Conflict`, `InvalidState`, `NotFound`,
//! `Unauthorized`, `InsufficientCredits`) are surfaced to callers and never
//! retried. `Storage` covers transient infrastructure failures; scheduled
//! jobs catch it per item and rely on their next run as the retry mechanism.

use thiserror::Error;

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced by the Courtbook core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed shape or range validation; rejected before any write
    #[error("validation failed: {0}")]
    Validation(String),

    /// The resource is already taken (overlapping booking, duplicate code)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation not legal for the entity's current lifecycle state
    #[error("invalid state: {entity} is {current}, cannot {operation}")]
    InvalidState {
        /// Entity description (e.g. "reservation 1234")
        entity: String,
        /// Current state name
        current: String,
        /// The operation that was attempted
        operation: String,
    },

    /// Entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind (e.g. "reservation")
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Caller is not allowed to perform the operation
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Wallet debit would overdraw the user's balance
    #[error("insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits {
        /// Current balance
        balance: crate::types::Money,
        /// Requested debit
        requested: crate::types::Money,
    },

    /// Transient infrastructure failure (store unavailable, query failed)
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`]
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`CoreError::InvalidState`]
    #[must_use]
    pub fn invalid_state(
        entity: impl Into<String>,
        current: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            entity: entity.into(),
            current: current.into(),
            operation: operation.into(),
        }
    }

    /// True for failures that the next scheduled run may succeed on
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
