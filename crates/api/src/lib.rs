//! HTTP API: server, routing, and request/response mapping around the ledger store.

pub mod app;
pub mod middleware;
pub mod shutdown;
