//! Strongly-typed account identifier.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of an account row.
///
/// Assigned by the store at creation time and never reused. The inner value is
/// the storage engine's `BIGSERIAL` key; lookups accept any integer so that a
/// caller can ask for an id that was never issued and get `NotFound` back.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(i64);

impl AccountId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for AccountId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<AccountId> for i64 {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

/// Failure to parse an [`AccountId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid account id '{input}': expected decimal digits only")]
pub struct ParseAccountIdError {
    input: String,
}

impl FromStr for AccountId {
    type Err = ParseAccountIdError;

    /// Parses the digits-only form used in URLs (`/account/42`). Signs and
    /// whitespace are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseAccountIdError {
            input: s.to_string(),
        };

        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }

        s.parse::<i64>().map(Self).map_err(|_| err())
    }
}
