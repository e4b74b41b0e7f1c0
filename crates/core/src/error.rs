//! Ledger error model.

use thiserror::Error;

use crate::id::AccountId;

/// Result type used across the ledger layer.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// This is the complete taxonomy callers have to handle. Every variant
/// guarantees that no partial mutation was left visible.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No account exists for the identifier.
    #[error("account with id={0} does not exist")]
    NotFound(AccountId),

    /// A transfer's source balance was smaller than the requested amount at
    /// check time. Nothing was changed.
    #[error("insufficient balance on account id={account}: available={balance}, required={requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: i64,
        requested: i64,
    },

    /// The storage engine failed (connection loss, write error, commit
    /// failure, exhausted conflict retries).
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Fieldless discriminant of [`LedgerError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InsufficientFunds,
    StorageFailure,
}

impl LedgerError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::Storage(_) => ErrorKind::StorageFailure,
        }
    }

    /// Client-correctable failures (the request can be fixed and resent).
    pub fn is_client_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::StorageFailure)
    }
}
