//! Worker process entry point

use anyhow::{Context, Result};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use lectern_execution::{run_worker, ResourceCache, TextDocumentConverter};

type StopFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Serve one conversion over stdin/stdout, then exit.
pub async fn run_worker_process() -> Result<()> {
    let stop = stop_signal().context("Failed to install worker signal handlers")?;
    let converter = TextDocumentConverter::new();
    let resources = ResourceCache::new();

    info!(pid = std::process::id(), "Worker process starting");

    let status = run_worker(tokio::io::stdin(), tokio::io::stdout(), &converter, &resources, stop)
        .await
        .context("Worker failed")?;

    match status {
        Some(status) => info!(%status, "Worker finished"),
        None => info!("Worker stopped before the conversion finished"),
    }
    Ok(())
}

/// Resolves on SIGTERM. Handlers are installed eagerly so a signal that
/// arrives before the first poll is not lost.
#[cfg(unix)]
fn stop_signal() -> std::io::Result<StopFuture> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    // Ctrl-C reaches the whole process group; the server decides when workers stop.
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(Box::pin(async move {
        loop {
            tokio::select! {
                _ = terminate.recv() => {
                    debug!("SIGTERM received");
                    return;
                }
                received = interrupt.recv() => {
                    if received.is_none() {
                        std::future::pending::<()>().await;
                    }
                    debug!("Ignoring SIGINT; waiting for the supervisor");
                }
            }
        }
    }))
}

#[cfg(not(unix))]
fn stop_signal() -> std::io::Result<StopFuture> {
    Ok(Box::pin(async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }))
}
