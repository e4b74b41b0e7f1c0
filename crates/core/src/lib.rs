//! `tally-core`: ledger domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! account identity, the account snapshot, and the ledger error taxonomy.

pub mod account;
pub mod error;
pub mod id;

pub use account::Account;
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use id::{AccountId, ParseAccountIdError};
