//! Account ledger storage boundary.
//!
//! The [`LedgerStore`] is the only component allowed to mutate account rows.
//! All balance invariants (non-negative balances, atomic transfers, no lost
//! updates) are enforced behind this trait, never by its callers.
//!
//! ## Backends
//!
//! - [`PostgresLedgerStore`]: production backend. Isolation comes from explicit
//!   row locks (`SELECT ... FOR UPDATE`, taken in ascending id order) inside a
//!   transaction, not from the engine's default isolation level.
//! - [`InMemoryLedgerStore`]: dev/tests. One mutex per account; transfers lock
//!   both accounts in ascending id order.
//!
//! ## Caller contract
//!
//! `credit` and `transfer` expect ids the caller has already resolved through
//! `find`. Validating that amounts are positive is also the caller's job.

pub mod in_memory;
pub mod postgres;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;

use tally_core::{Account, AccountId, LedgerResult};

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use retry::RetryPolicy;

/// Durable, concurrency-safe store of account balances.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new account with balance 0 and return its id.
    async fn open(&self) -> LedgerResult<AccountId>;

    /// Read the current snapshot of an account.
    ///
    /// Returns `LedgerError::NotFound` if no account has this id.
    async fn find(&self, id: AccountId) -> LedgerResult<Account>;

    /// Atomically add `amount` to the account balance.
    ///
    /// An id with no row is a silent no-op. Do not use this for existence
    /// checks; call [`LedgerStore::find`] first.
    async fn credit(&self, id: AccountId, amount: i64) -> LedgerResult<()>;

    /// Move `amount` from `source` to `target` as one unit of work.
    ///
    /// Fails with `LedgerError::InsufficientFunds` when the source balance,
    /// read under lock, cannot cover `amount`. On any error neither account
    /// is changed.
    async fn transfer(&self, source: AccountId, target: AccountId, amount: i64) -> LedgerResult<()>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn open(&self) -> LedgerResult<AccountId> {
        (**self).open().await
    }

    async fn find(&self, id: AccountId) -> LedgerResult<Account> {
        (**self).find(id).await
    }

    async fn credit(&self, id: AccountId, amount: i64) -> LedgerResult<()> {
        (**self).credit(id, amount).await
    }

    async fn transfer(&self, source: AccountId, target: AccountId, amount: i64) -> LedgerResult<()> {
        (**self).transfer(source, target, amount).await
    }
}

/// Lock acquisition order for a transfer: ascending id, deduplicated.
///
/// Both backends take locks in this order so that two transfers running in
/// opposite directions between the same pair cannot deadlock.
pub(crate) fn lock_order(source: AccountId, target: AccountId) -> Vec<AccountId> {
    if source == target {
        vec![source]
    } else if source < target {
        vec![source, target]
    } else {
        vec![target, source]
    }
}
