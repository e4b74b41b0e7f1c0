use std::sync::Arc;

use tally_core::{LedgerError, LedgerResult};
use tally_infra::config::{AppConfig, StoreKind};
use tally_infra::ledger::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore};

/// Store backing the HTTP handlers.
///
/// Handlers only see `ledger()`; the variant matters for startup and shutdown.
#[derive(Clone)]
pub enum AppServices {
    InMemory { ledger: Arc<InMemoryLedgerStore> },
    Persistent { ledger: Arc<PostgresLedgerStore> },
}

impl AppServices {
    pub fn in_memory() -> Self {
        Self::InMemory {
            ledger: InMemoryLedgerStore::arc(),
        }
    }

    pub fn persistent(store: PostgresLedgerStore) -> Self {
        Self::Persistent {
            ledger: Arc::new(store),
        }
    }

    /// Build the store selected by `config`.
    ///
    /// For postgres this connects, applies the schema, and installs the
    /// configured retry policy.
    pub async fn from_config(config: &AppConfig) -> LedgerResult<Self> {
        match config.store {
            StoreKind::Memory => {
                tracing::warn!("running on the in-memory store; balances are lost on restart");
                Ok(Self::in_memory())
            }
            StoreKind::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| LedgerError::storage("DATABASE_URL is not set"))?;

                let store = PostgresLedgerStore::connect(url, config.max_connections)
                    .await?
                    .with_retry_policy(config.retry_policy());
                store.migrate().await?;

                tracing::info!(max_connections = config.max_connections, "connected to postgres");
                Ok(Self::persistent(store))
            }
        }
    }

    pub fn ledger(&self) -> &dyn LedgerStore {
        match self {
            Self::InMemory { ledger } => ledger.as_ref(),
            Self::Persistent { ledger } => ledger.as_ref(),
        }
    }

    /// Release backend resources. Closing the pool waits for checked-out
    /// connections to be returned.
    pub async fn shutdown(&self) {
        if let Self::Persistent { ledger } = self {
            ledger.close().await;
            tracing::info!("postgres pool closed");
        }
    }
}
