//! `lectern serve`: HTTP surface, worker supervision and retention

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use lectern_config::{LecternConfig, RetentionConfig};
use lectern_core::{JobRegistry, ProgressChannels};
use lectern_execution::{SupervisorConfig, WorkerSupervisor};
use lectern_rest_api::{create_rest_app, AppConfig, JobsContext, StreamSettings};

pub async fn serve(config: LecternConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.storage.upload_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create upload directory {}",
                config.storage.upload_dir.display()
            )
        })?;

    let supervisor_config = SupervisorConfig::from_config(&config.execution, &config.progress)
        .context("Failed to resolve the worker program")?;
    info!(program = %supervisor_config.program.display(), "Worker program resolved");

    let registry = Arc::new(JobRegistry::new());
    let channels = Arc::new(ProgressChannels::new());
    let supervisor = Arc::new(WorkerSupervisor::new(supervisor_config, registry, channels));

    let context = JobsContext::new(
        supervisor.clone(),
        config.storage.clone(),
        StreamSettings::from(&config.progress),
    );
    let app = create_rest_app(context, AppConfig::from(&config.server));

    let sweeper = spawn_retention_sweeper(supervisor.clone(), config.retention.clone());

    let addr = config.server.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on: http://{}", addr);
    info!("Job API available at: http://{}{}/jobs", addr, config.server.api_prefix);

    // Workers are stopped as soon as the signal arrives so open progress
    // streams observe `cancelled` and let the server drain.
    let shutdown = {
        let supervisor = supervisor.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown requested, stopping workers");
            supervisor.shutdown_all().await;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    sweeper.abort();
    supervisor.shutdown_all().await;
    info!("Server stopped");
    Ok(())
}

/// Periodically evict finished jobs and release exited workers
pub fn spawn_retention_sweeper(
    supervisor: Arc<WorkerSupervisor>,
    retention: RetentionConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(retention.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_once(&supervisor, retention.terminal_ttl);
        }
    })
}

/// Returns `(evicted jobs, reaped workers)`
pub fn sweep_once(supervisor: &WorkerSupervisor, terminal_ttl: Duration) -> (usize, usize) {
    let evicted = supervisor.registry().evict_finished(terminal_ttl);
    for job_id in &evicted {
        supervisor.cleanup(job_id);
    }
    let reaped = supervisor.reap_exited();

    if evicted.is_empty() && reaped == 0 {
        debug!("Retention sweep found nothing to do");
    } else {
        info!(evicted = evicted.len(), reaped, "Retention sweep complete");
    }
    (evicted.len(), reaped)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
