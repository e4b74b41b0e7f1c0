//! Account snapshot.

use serde::{Deserialize, Serialize};

use crate::id::AccountId;

/// A point-in-time view of one account row.
///
/// The store is the only owner of account state; this is a copy handed to
/// callers and mutating it has no effect on the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Balance in the smallest currency unit. Never negative.
    pub balance: i64,
}

impl Account {
    /// Whether `amount` can be debited without the balance going negative.
    pub fn can_cover(&self, amount: i64) -> bool {
        self.balance.checked_sub(amount).is_some_and(|rest| rest >= 0)
    }
}
