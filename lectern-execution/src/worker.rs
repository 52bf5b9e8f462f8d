//! Worker process runtime
//!
//! A worker announces itself with `Ready`, runs exactly one `RunConversion`
//! and exits. While the conversion runs it keeps listening for `Shutdown`
//! on stdin and for the stop signal; either one drops the conversion, which
//! removes the input file on the way out.

use lectern_core::{JobStatus, NoopProgressSink, ProgressSink};
use lectern_ipc::{CoordinatorMessage, IpcError, IpcReader, IpcWriter, WorkerError, WorkerMessage};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entry::{self, Converter};
use crate::error::ExecutionError;
use crate::resources::ResourceCache;
use crate::sinks::{IpcProgressSink, IpcStatusWriter, WebhookProgressSink};

/// Serve one job over the given pipes.
///
/// Returns the terminal status the conversion wrote, or `None` when the
/// worker was told to stop before finishing.
pub async fn run_worker<R, W, C, S>(
    reader: R,
    writer: W,
    converter: &C,
    resources: &ResourceCache<C::Resource>,
    stop: S,
) -> Result<Option<JobStatus>, ExecutionError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
    C: Converter + ?Sized,
    S: Future<Output = ()>,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(drain_outgoing(IpcWriter::new(writer), rx));

    let result = serve(IpcReader::new(reader), tx, converter, resources, stop).await;

    if resources.teardown().await {
        debug!("Conversion resources released");
    }
    // All senders are gone once `serve` returns; the writer flushes and closes.
    if let Err(e) = writer_task.await {
        warn!("IPC writer task failed: {}", e);
    }
    result
}

async fn serve<R, C, S>(
    mut reader: IpcReader<R>,
    tx: mpsc::UnboundedSender<CoordinatorMessage>,
    converter: &C,
    resources: &ResourceCache<C::Resource>,
    stop: S,
) -> Result<Option<JobStatus>, ExecutionError>
where
    R: AsyncRead + Unpin + Send,
    C: Converter + ?Sized,
    S: Future<Output = ()>,
{
    tokio::pin!(stop);

    let pid = std::process::id();
    tx.send(CoordinatorMessage::Ready {
        worker_id: format!("worker-{}", pid),
        pid,
    })
    .map_err(|_| ExecutionError::Protocol("IPC writer closed before ready".into()))?;

    let (job, settings) = loop {
        tokio::select! {
            _ = &mut stop => {
                info!("Stop requested before a job arrived");
                return Ok(None);
            }
            message = reader.receive::<WorkerMessage>() => match message {
                Ok(envelope) => match envelope.message {
                    WorkerMessage::RunConversion { job, settings } => break (job, settings),
                    WorkerMessage::Shutdown => {
                        info!("Shutdown received before a job arrived");
                        return Ok(None);
                    }
                },
                Err(IpcError::ConnectionClosed) => {
                    debug!("Supervisor closed the pipe before sending a job");
                    return Ok(None);
                }
                Err(e) if e.is_recoverable() => report_parse_error(&tx, &e),
                Err(e) => return Err(e.into()),
            }
        }
    };

    let job_id = job.job_id;
    info!(job_id = %job_id, format = %job.output_format, "Job received");

    let status_writer = IpcStatusWriter::new(job_id, job.epoch, tx.clone());
    let (sink, webhook_task): (Arc<dyn ProgressSink>, Option<JoinHandle<()>>) =
        match job.progress_webhook_url.as_deref() {
            Some(url) => match WebhookProgressSink::spawn(
                job_id,
                url,
                Duration::from_millis(settings.webhook_throttle_ms),
                Duration::from_millis(settings.webhook_timeout_ms),
            ) {
                Ok((sink, handle)) => (Arc::new(sink), Some(handle)),
                Err(e) => {
                    warn!(job_id = %job_id, "Webhook progress disabled: {}", e);
                    let _ = tx.send(CoordinatorMessage::Error {
                        job_id: Some(job_id),
                        error: WorkerError::WebhookUnavailable {
                            error: e.to_string(),
                        },
                    });
                    (Arc::new(NoopProgressSink), None)
                }
            },
            None => (Arc::new(IpcProgressSink::new(job_id, tx.clone())), None),
        };

    let status = {
        let conversion = entry::run(&job, &status_writer, sink, converter, resources);
        tokio::pin!(conversion);

        loop {
            tokio::select! {
                status = &mut conversion => break Some(status),
                _ = &mut stop => {
                    info!(job_id = %job_id, "Stop signal received, abandoning conversion");
                    break None;
                }
                message = reader.receive::<WorkerMessage>() => match message {
                    Ok(envelope) => match envelope.message {
                        WorkerMessage::Shutdown => {
                            info!(job_id = %job_id, "Shutdown requested, abandoning conversion");
                            break None;
                        }
                        WorkerMessage::RunConversion { job, .. } => {
                            warn!(job_id = %job.job_id, "Worker is busy, job ignored");
                            let _ = tx.send(CoordinatorMessage::Error {
                                job_id: Some(job.job_id),
                                error: WorkerError::JobRejected {
                                    error: format!("worker is busy with job {}", job_id),
                                },
                            });
                        }
                    },
                    Err(IpcError::ConnectionClosed) => {
                        info!(job_id = %job_id, "Supervisor went away, abandoning conversion");
                        break None;
                    }
                    Err(e) if e.is_recoverable() => report_parse_error(&tx, &e),
                    Err(e) => {
                        warn!(job_id = %job_id, "IPC read failed: {}", e);
                        break None;
                    }
                }
            }
        }
    };

    if let Some(handle) = webhook_task {
        if status.is_some() {
            if let Err(e) = handle.await {
                warn!(job_id = %job_id, "Webhook task failed: {}", e);
            }
        } else {
            handle.abort();
        }
    }

    Ok(status)
}

fn report_parse_error(tx: &mpsc::UnboundedSender<CoordinatorMessage>, error: &IpcError) {
    warn!("Ignoring malformed message: {}", error);
    let _ = tx.send(CoordinatorMessage::Error {
        job_id: None,
        error: WorkerError::MessageParseError {
            error: error.to_string(),
        },
    });
}

async fn drain_outgoing<W>(
    mut writer: IpcWriter<W>,
    mut rx: mpsc::UnboundedReceiver<CoordinatorMessage>,
) where
    W: AsyncWrite + Unpin + Send,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = writer.send_message(message).await {
            warn!("IPC write failed: {}", e);
            return;
        }
    }
    if let Err(e) = writer.close().await {
        debug!("IPC close failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{TextDocumentConverter, PAGE_DELAY_OPTION};
    use lectern_core::{ConversionJob, JobId, OutputFormat};
    use lectern_ipc::WorkerSettings;
    use serde_json::json;
    use tokio::io::{duplex, DuplexStream};

    struct Harness {
        to_worker: IpcWriter<DuplexStream>,
        from_worker: IpcReader<DuplexStream>,
        worker: JoinHandle<Result<Option<JobStatus>, ExecutionError>>,
    }

    fn spawn_worker<S>(stop: S) -> Harness
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let (worker_in, supervisor_out) = duplex(64 * 1024);
        let (supervisor_in, worker_out) = duplex(64 * 1024);
        let worker = tokio::spawn(async move {
            let converter = TextDocumentConverter::new();
            let resources = ResourceCache::new();
            run_worker(worker_in, worker_out, &converter, &resources, stop).await
        });
        Harness {
            to_worker: IpcWriter::new(supervisor_out),
            from_worker: IpcReader::new(supervisor_in),
            worker,
        }
    }

    fn job(dir: &tempfile::TempDir, delay_ms: Option<u64>) -> ConversionJob {
        let input_path = dir.path().join("notes.txt");
        std::fs::write(&input_path, "one\n---\ntwo").unwrap();
        let mut options = serde_json::Map::new();
        if let Some(ms) = delay_ms {
            options.insert(PAGE_DELAY_OPTION.into(), json!(ms));
        }
        ConversionJob {
            job_id: JobId::new(),
            input_path,
            output_format: OutputFormat::Markdown,
            options,
            progress_webhook_url: None,
            epoch: 4,
        }
    }

    async fn next(h: &mut Harness) -> Result<CoordinatorMessage, IpcError> {
        h.from_worker
            .receive::<CoordinatorMessage>()
            .await
            .map(|e| e.message)
    }

    #[tokio::test]
    async fn test_runs_one_job_and_streams_messages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(&dir, None);
        let mut h = spawn_worker(std::future::pending());

        assert!(matches!(next(&mut h).await.unwrap(), CoordinatorMessage::Ready { .. }));
        h.to_worker
            .send_message(WorkerMessage::RunConversion {
                job: job.clone(),
                settings: WorkerSettings::default(),
            })
            .await
            .unwrap();

        let mut messages = Vec::new();
        loop {
            match next(&mut h).await {
                Ok(message) => messages.push(message),
                Err(IpcError::ConnectionClosed) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        let statuses: Vec<JobStatus> = messages
            .iter()
            .filter_map(|m| match m {
                CoordinatorMessage::StatusUpdate { epoch, update, .. } => {
                    assert_eq!(*epoch, 4);
                    update.status
                }
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![JobStatus::Processing, JobStatus::Completed]);

        let progress: Vec<(u64, u64)> = messages
            .iter()
            .filter_map(|m| match m {
                CoordinatorMessage::Progress { event, .. } => Some((event.current, event.total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(0, 2), (1, 2), (2, 2)]);

        assert_eq!(h.worker.await.unwrap().unwrap(), Some(JobStatus::Completed));
        assert!(!job.input_path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_mid_conversion_cleans_up_without_terminal_write() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(&dir, Some(60_000));
        let mut h = spawn_worker(std::future::pending());

        next(&mut h).await.unwrap();
        h.to_worker
            .send_message(WorkerMessage::RunConversion {
                job: job.clone(),
                settings: WorkerSettings::default(),
            })
            .await
            .unwrap();

        // Wait for the processing write, then ask the worker to stop
        loop {
            if let CoordinatorMessage::StatusUpdate { update, .. } = next(&mut h).await.unwrap() {
                assert_eq!(update.status, Some(JobStatus::Processing));
                break;
            }
        }
        h.to_worker.send_message(WorkerMessage::Shutdown).await.unwrap();

        assert_eq!((&mut h.worker).await.unwrap().unwrap(), None);
        assert!(!job.input_path.exists());

        while let Ok(message) = next(&mut h).await {
            if let CoordinatorMessage::StatusUpdate { update, .. } = message {
                assert!(!update.status.map(|s| s.is_terminal()).unwrap_or(false));
            }
        }
    }

    #[tokio::test]
    async fn test_stop_signal_before_job_exits_cleanly() {
        let mut h = spawn_worker(async {});
        assert_eq!((&mut h.worker).await.unwrap().unwrap(), None);
        let _ = next(&mut h).await;
    }

    #[tokio::test]
    async fn test_closed_stdin_before_job_exits_cleanly() {
        let mut h = spawn_worker(std::future::pending());
        next(&mut h).await.unwrap();
        h.to_worker.close().await.unwrap();
        drop(h.to_worker);
        assert_eq!(h.worker.await.unwrap().unwrap(), None);
    }
}
