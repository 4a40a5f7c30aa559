use thiserror::Error;

use crate::repositories::RepositoryError;

/// Errors surfaced by the domain services; mapped onto HTTP responses in
/// `routes::error`.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A field failed a structural constraint (blank, too long, negative).
    #[error("{0}")]
    Validation(String),
    /// A business rule on the input was violated.
    #[error("{0}")]
    InvalidInput(String),
    #[error("Invalid period: {0}. Must be 'week', 'month', or 'year'")]
    InvalidPeriod(String),
    #[error("Invalid date format: {0}. Use YYYY-MM-DD")]
    InvalidDateFormat(String),
    /// Unknown id, or owned by a different user; deliberately the same error.
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
