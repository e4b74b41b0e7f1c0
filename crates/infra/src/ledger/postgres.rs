//! Postgres-backed ledger store.
//!
//! ## Isolation
//!
//! `transfer` does not rely on the engine's default isolation level. Inside a
//! read-committed transaction it locks both account rows with
//! `SELECT ... ORDER BY id FOR UPDATE`, so the sufficiency check runs against a
//! balance no other transaction can change until commit. Rows are always
//! locked in ascending id order, which rules out lock-order deadlocks between
//! transfers running in opposite directions.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerError | Scenario |
//! |------------|----------------------|-------------|----------|
//! | Database (check violation) | `23514` | `InsufficientFunds` | A write would have made a balance negative |
//! | Database (serialization failure) | `40001` | retried, then `Storage` | Engine aborted the transaction |
//! | Database (deadlock detected) | `40P01` | retried, then `Storage` | Engine aborted the transaction |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed / PoolTimedOut | N/A | `Storage` | Pool shut down or exhausted |
//! | Other | N/A | `Storage` | Network errors, TLS, protocol errors |
//!
//! ## Cancellation
//!
//! Dropping a `transfer` future mid-flight drops the open `Transaction`, which
//! rolls back. Nothing is committed unless `commit` completed.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, debug, error, instrument, warn};

use tally_core::{Account, AccountId, LedgerError, LedgerResult};

use super::retry::RetryPolicy;
use super::{LedgerStore, lock_order};

/// Schema for the `accounts` relation. Idempotent.
pub const SCHEMA: &str = include_str!("../../migrations/0001_accounts.sql");

const SQLSTATE_CHECK_VIOLATION: &str = "23514";
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";

/// Postgres-backed ledger store.
///
/// Uses the SQLx connection pool, which is `Send + Sync` and cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
    retry: RetryPolicy,
}

/// Failure of one transfer attempt, before deciding whether to retry it.
#[derive(Debug)]
enum AttemptError {
    Ledger(LedgerError),
    Sqlx(&'static str, sqlx::Error),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Sqlx(_, e) if is_serialization_conflict(e))
    }
}

impl From<LedgerError> for AttemptError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl PostgresLedgerStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            retry: RetryPolicy::default(),
        }
    }

    /// Open a connection pool against `database_url`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> LedgerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create the `accounts` table if it does not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> LedgerResult<()> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Close the pool. Later operations fail with `LedgerError::Storage`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[instrument(skip(self), fields(account_id), err)]
    pub async fn open_account(&self) -> LedgerResult<AccountId> {
        let id: i64 = sqlx::query_scalar("INSERT INTO accounts DEFAULT VALUES RETURNING id")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("open_account", e))?;

        Span::current().record("account_id", id);
        Ok(AccountId::new(id))
    }

    #[instrument(skip(self, id), fields(account_id = %id))]
    pub async fn find_account(&self, id: AccountId) -> LedgerResult<Account> {
        let row = sqlx::query("SELECT id, balance FROM accounts WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_account", e))?;

        match row {
            Some(row) => {
                let row = AccountRow::from_row(&row).map_err(|e| map_sqlx_error("decode_account", e))?;
                Ok(row.into())
            }
            None => Err(LedgerError::NotFound(id)),
        }
    }

    #[instrument(skip(self, id), fields(account_id = %id), err)]
    pub async fn credit_account(&self, id: AccountId, amount: i64) -> LedgerResult<()> {
        let result = match sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
            .bind(amount)
            .bind(id.get())
            .execute(&*self.pool)
            .await
        {
            Ok(result) => result,
            // Only reachable with a negative amount. The failed statement
            // changed nothing, so report the balance as it stands now.
            Err(e) if check_violation(&e) => {
                let balance = self.find_account(id).await?.balance;
                return Err(LedgerError::InsufficientFunds {
                    account: id,
                    balance,
                    requested: amount.saturating_neg(),
                });
            }
            Err(e) => return Err(map_sqlx_error("credit_account", e)),
        };

        if result.rows_affected() == 0 {
            debug!("credit matched no account");
        }
        Ok(())
    }

    /// Transfer with bounded retry of serialization conflicts.
    #[instrument(skip(self, source, target), fields(source = %source, target = %target))]
    pub async fn transfer_funds(&self, source: AccountId, target: AccountId, amount: i64) -> LedgerResult<()> {
        match with_conflict_retry(&self.retry, || self.transfer_once(source, target, amount)).await {
            Ok(()) => Ok(()),
            Err((AttemptError::Ledger(e), _)) => {
                debug!(error = %e, "transfer rejected");
                Err(e)
            }
            Err((AttemptError::Sqlx(op, e), attempt)) => {
                let e = map_sqlx_error(op, e);
                error!(error = %e, attempt, "transfer failed");
                Err(e)
            }
        }
    }

    /// One unit of work: lock, check, credit target, debit source, commit.
    async fn transfer_once(&self, source: AccountId, target: AccountId, amount: i64) -> Result<(), AttemptError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AttemptError::Sqlx("begin_transaction", e))?;

        let locked = lock_accounts(&mut tx, source, target).await?;
        let find = |id: AccountId| locked.iter().find(|a| a.id == id).copied();

        let Some(src) = find(source) else {
            rollback(tx).await;
            return Err(LedgerError::NotFound(source).into());
        };
        if find(target).is_none() {
            rollback(tx).await;
            return Err(LedgerError::NotFound(target).into());
        }

        let insufficient = LedgerError::InsufficientFunds {
            account: source,
            balance: src.balance,
            requested: amount,
        };
        if !src.can_cover(amount) {
            rollback(tx).await;
            return Err(insufficient.into());
        }

        if source != target {
            adjust_balance(&mut tx, target, amount, "credit_target", &insufficient).await?;
            adjust_balance(&mut tx, source, -amount, "debit_source", &insufficient).await?;
        }

        tx.commit()
            .await
            .map_err(|e| AttemptError::Sqlx("commit_transaction", e))?;
        Ok(())
    }
}

/// Re-run `run` while it fails with a serialization conflict and the policy
/// has attempts left. On failure, returns the last error with the number of
/// attempts made.
async fn with_conflict_retry<F, Fut>(retry: &RetryPolicy, mut run: F) -> Result<(), (AttemptError, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), AttemptError>>,
{
    let attempts = retry.attempts();
    let mut attempt = 1;
    loop {
        let err = match run().await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= attempts {
            return Err((err, attempt));
        }

        warn!(attempt, max_attempts = attempts, "transfer hit a serialization conflict, retrying");
        tokio::time::sleep(retry.delay_after(attempt)).await;
        attempt += 1;
    }
}

/// Lock the rows of both transfer parties in ascending id order.
async fn lock_accounts(
    tx: &mut Transaction<'_, Postgres>,
    source: AccountId,
    target: AccountId,
) -> Result<Vec<Account>, AttemptError> {
    let ids: Vec<i64> = lock_order(source, target).into_iter().map(AccountId::get).collect();

    let rows = sqlx::query("SELECT id, balance FROM accounts WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(&ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| AttemptError::Sqlx("lock_accounts", e))?;

    rows.iter()
        .map(|row| AccountRow::from_row(row).map(Account::from))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AttemptError::Sqlx("decode_account", e))
}

async fn adjust_balance(
    tx: &mut Transaction<'_, Postgres>,
    id: AccountId,
    delta: i64,
    op: &'static str,
    on_check_violation: &LedgerError,
) -> Result<(), AttemptError> {
    sqlx::query("UPDATE accounts SET balance = balance + $1 WHERE id = $2")
        .bind(delta)
        .bind(id.get())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if check_violation(&e) {
                AttemptError::Ledger(on_check_violation.clone())
            } else {
                AttemptError::Sqlx(op, e)
            }
        })?;
    Ok(())
}

/// Explicit rollback for business rejections. Dropping the transaction would
/// roll back too; this only releases the row locks sooner.
async fn rollback(tx: Transaction<'_, Postgres>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "rollback failed; connection will discard the transaction");
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn open(&self) -> LedgerResult<AccountId> {
        self.open_account().await
    }

    async fn find(&self, id: AccountId) -> LedgerResult<Account> {
        self.find_account(id).await
    }

    async fn credit(&self, id: AccountId, amount: i64) -> LedgerResult<()> {
        self.credit_account(id, amount).await
    }

    async fn transfer(&self, source: AccountId, target: AccountId, amount: i64) -> LedgerResult<()> {
        self.transfer_funds(source, target, amount).await
    }
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn check_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(SQLSTATE_CHECK_VIOLATION)
}

/// Serialization failures and deadlocks: the engine aborted the transaction
/// and the same unit of work may succeed if re-run.
fn is_serialization_conflict(err: &sqlx::Error) -> bool {
    matches!(
        sqlstate(err).as_deref(),
        Some(SQLSTATE_SERIALIZATION_FAILURE | SQLSTATE_DEADLOCK_DETECTED)
    )
}

/// Map SQLx errors to `LedgerError::Storage`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            LedgerError::storage(format!(
                "database error in {operation} (sqlstate {code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => LedgerError::storage(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => {
            LedgerError::storage(format!("timed out acquiring a connection in {operation}"))
        }
        _ => LedgerError::storage(format!("sqlx error in {operation}: {err}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct AccountRow {
    id: i64,
    balance: i64,
}

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            balance: row.try_get("balance")?,
        })
    }
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: AccountId::new(row.id),
            balance: row.balance,
        }
    }
}
