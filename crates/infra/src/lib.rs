//! Infrastructure layer: ledger storage backends and configuration.

pub mod config;
pub mod ledger;
