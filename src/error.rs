//! Crate-wide error taxonomy.
//!
//! Every fallible operation returns this crate's own [`Error`] via
//! `?`, never a boxed `dyn Error` or a generic `anyhow::Error` — callers
//! need a typed variant to react to (e.g. deciding whether to retry a
//! job, or surfacing `Forbidden` as a client error).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("insufficient shares: {0}")]
    InsufficientShares(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A violated internal invariant. Surfacing one of these means a bug,
    /// not a bad request; the account/order involved is quarantined
    /// rather than the process being torn down, per the recovery
    /// strategy in the design notes.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    Error::Conflict(db_err.to_string())
                } else if db_err.is_check_violation() {
                    Error::Invariant(db_err.to_string())
                } else {
                    Error::Invariant(db_err.to_string())
                }
            }
            sqlx::Error::RowNotFound => Error::NotFound(err.to_string()),
            other => Error::Invariant(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
