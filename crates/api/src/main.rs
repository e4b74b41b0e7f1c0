use std::net::SocketAddr;

use anyhow::Context;

use tally_api::app::{self, AppServices};
use tally_api::shutdown;
use tally_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tally_observability::init();

    let config = AppConfig::from_env().context("cannot load configuration")?;
    let services = AppServices::from_config(&config)
        .await
        .context("cannot initialise the account store")?;

    let app = app::build_app(services.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    let result = shutdown::serve(listener, app, config.shutdown_grace_period, async {
        let cause = shutdown::signal().await;
        tracing::info!(signal = cause, "shutdown requested");
    })
    .await;

    services.shutdown().await;
    result.context("http server failed")?;
    tracing::info!("application stopped");
    Ok(())
}
