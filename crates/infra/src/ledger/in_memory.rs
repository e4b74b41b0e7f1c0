use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use tracing::debug;

use tally_core::{Account, AccountId, LedgerError, LedgerResult};

use super::{LedgerStore, lock_order};

type Balance = Arc<Mutex<i64>>;

/// In-memory ledger store.
///
/// Intended for tests/dev. Each account balance sits behind its own mutex, so
/// operations on disjoint accounts never contend; the outer `RwLock` only
/// guards the id → balance map and is held for lookups and inserts.
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    accounts: RwLock<HashMap<AccountId, Balance>>,
    next_id: AtomicI64,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of accounts opened so far.
    pub fn len(&self) -> usize {
        self.accounts.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn balance_of(&self, id: AccountId) -> LedgerResult<Option<Balance>> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| LedgerError::storage("account map lock poisoned"))?;
        Ok(accounts.get(&id).cloned())
    }

    fn lock(id: AccountId, balance: &Balance) -> LedgerResult<MutexGuard<'_, i64>> {
        balance
            .lock()
            .map_err(|_| LedgerError::storage(format!("balance lock poisoned for account id={id}")))
    }

    fn apply(id: AccountId, current: i64, delta: i64) -> LedgerResult<i64> {
        let next = current
            .checked_add(delta)
            .ok_or_else(|| LedgerError::storage(format!("balance overflow on account id={id}")))?;
        if next < 0 {
            return Err(LedgerError::InsufficientFunds {
                account: id,
                balance: current,
                requested: delta.saturating_neg(),
            });
        }
        Ok(next)
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn open(&self) -> LedgerResult<AccountId> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| LedgerError::storage("account map lock poisoned"))?;

        let id = AccountId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        accounts.insert(id, Arc::new(Mutex::new(0)));
        debug!(account_id = %id, "account opened");
        Ok(id)
    }

    async fn find(&self, id: AccountId) -> LedgerResult<Account> {
        let balance = self.balance_of(id)?.ok_or(LedgerError::NotFound(id))?;
        let guard = Self::lock(id, &balance)?;
        Ok(Account { id, balance: *guard })
    }

    async fn credit(&self, id: AccountId, amount: i64) -> LedgerResult<()> {
        let Some(balance) = self.balance_of(id)? else {
            debug!(account_id = %id, amount, "credit matched no account");
            return Ok(());
        };

        let mut guard = Self::lock(id, &balance)?;
        *guard = Self::apply(id, *guard, amount)?;
        Ok(())
    }

    async fn transfer(&self, source: AccountId, target: AccountId, amount: i64) -> LedgerResult<()> {
        // Resolve both balances first; a missing row aborts before any lock.
        let order = lock_order(source, target);
        let mut balances = Vec::with_capacity(order.len());
        for id in &order {
            let balance = self.balance_of(*id)?.ok_or(LedgerError::NotFound(*id))?;
            balances.push((*id, balance));
        }

        let mut guards = Vec::with_capacity(balances.len());
        for (id, balance) in &balances {
            guards.push((*id, Self::lock(*id, balance)?));
        }

        let position = |id: AccountId| guards.iter().position(|(g, _)| *g == id);
        let (Some(src), Some(dst)) = (position(source), position(target)) else {
            return Err(LedgerError::storage("transfer lock set is inconsistent"));
        };

        let snapshot = Account {
            id: source,
            balance: *guards[src].1,
        };
        if !snapshot.can_cover(amount) {
            return Err(LedgerError::InsufficientFunds {
                account: source,
                balance: snapshot.balance,
                requested: amount,
            });
        }

        if src == dst {
            return Ok(());
        }

        // Compute both results before writing either, so a failure leaves
        // both balances untouched.
        let new_target = Self::apply(target, *guards[dst].1, amount)?;
        let new_source = snapshot.balance - amount;

        *guards[dst].1 = new_target;
        *guards[src].1 = new_source;
        Ok(())
    }
}
