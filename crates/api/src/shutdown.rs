//! Signal handling and graceful shutdown with a bounded grace period.

use std::future::Future;
use std::io;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Resolve once SIGINT, SIGTERM or SIGQUIT arrives, returning the signal name.
pub async fn signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = unix_signal(tokio::signal::unix::SignalKind::terminate(), "SIGTERM");
    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    #[cfg(unix)]
    let quit = unix_signal(tokio::signal::unix::SignalKind::quit(), "SIGQUIT");
    #[cfg(not(unix))]
    let quit = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
        name = quit => name,
    }
}

#[cfg(unix)]
async fn unix_signal(kind: tokio::signal::unix::SignalKind, name: &'static str) -> &'static str {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, signal = name, "cannot install signal handler");
            std::future::pending::<()>().await;
        }
    }
    name
}

/// Serve `app` until `shutdown` resolves, then stop accepting connections and
/// give in-flight requests up to `grace` to finish before abandoning them.
pub async fn serve<F>(listener: TcpListener, app: Router, grace: Duration, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (begin_tx, begin_rx) = oneshot::channel::<()>();

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.await;
        let _ = begin_tx.send(());
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut server => return joined.map_err(io::Error::other)?,
        Ok(()) = begin_rx => {}
    }

    tracing::info!(grace_period_ms = grace.as_millis() as u64, "graceful shutdown started");
    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => {
            joined.map_err(io::Error::other)??;
            tracing::info!("graceful shutdown finished");
        }
        Err(_) => {
            server.abort();
            tracing::warn!("grace period elapsed; dropping in-flight requests");
        }
    }
    Ok(())
}
