//! Worker-side progress sinks and status writers
//!
//! In shared-channel mode everything leaves the worker as IPC messages on a
//! single ordered queue. In webhook mode progress goes straight to the
//! caller's URL while status writes still take the IPC path.

use lectern_core::{JobId, JobUpdate, ProgressEvent, ProgressSink, WebhookThrottle};
use lectern_ipc::CoordinatorMessage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::entry::StatusWriter;
use crate::error::ExecutionError;

/// Forwards every progress report over IPC
pub struct IpcProgressSink {
    job_id: JobId,
    tx: mpsc::UnboundedSender<CoordinatorMessage>,
}

impl IpcProgressSink {
    pub fn new(job_id: JobId, tx: mpsc::UnboundedSender<CoordinatorMessage>) -> Self {
        Self { job_id, tx }
    }
}

impl ProgressSink for IpcProgressSink {
    fn report(&self, event: &ProgressEvent) {
        let message = CoordinatorMessage::Progress {
            job_id: self.job_id,
            event: event.clone(),
        };
        if self.tx.send(message).is_err() {
            debug!(job_id = %self.job_id, "Progress dropped, IPC writer gone");
        }
    }
}

/// Sends status writes to the supervisor, stamped with the job's epoch
pub struct IpcStatusWriter {
    job_id: JobId,
    epoch: u64,
    tx: mpsc::UnboundedSender<CoordinatorMessage>,
}

impl IpcStatusWriter {
    pub fn new(job_id: JobId, epoch: u64, tx: mpsc::UnboundedSender<CoordinatorMessage>) -> Self {
        Self { job_id, epoch, tx }
    }
}

impl StatusWriter for IpcStatusWriter {
    fn write(&self, update: JobUpdate) {
        let message = CoordinatorMessage::StatusUpdate {
            job_id: self.job_id,
            epoch: self.epoch,
            update,
        };
        if self.tx.send(message).is_err() {
            warn!(job_id = %self.job_id, "Status write dropped, IPC writer gone");
        }
    }
}

/// Body of a webhook progress post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub job_id: JobId,
    pub stage: String,
    pub current: u64,
    pub total: u64,
}

/// Posts throttled progress to a caller-supplied URL.
///
/// Posts go out one at a time from a single background task, so their order
/// matches the order of reports. Delivery failures are logged and dropped.
pub struct WebhookProgressSink {
    job_id: JobId,
    throttle: Mutex<WebhookThrottle>,
    tx: mpsc::UnboundedSender<WebhookPayload>,
}

impl WebhookProgressSink {
    /// Build the sink and its delivery task.
    ///
    /// The task ends once the sink is dropped and its queue is drained; await
    /// the handle to flush pending posts.
    pub fn spawn(
        job_id: JobId,
        url: impl Into<String>,
        throttle: Duration,
        timeout: Duration,
    ) -> Result<(Self, JoinHandle<()>), ExecutionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let url = url.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<WebhookPayload>();

        let handle = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let result = client
                    .post(&url)
                    .json(&payload)
                    .send()
                    .await
                    .and_then(|response| response.error_for_status());
                if let Err(e) = result {
                    warn!(
                        job_id = %payload.job_id,
                        stage = %payload.stage,
                        "Webhook delivery failed: {}", e
                    );
                }
            }
        });

        let sink = Self {
            job_id,
            throttle: Mutex::new(WebhookThrottle::new(throttle)),
            tx,
        };
        Ok((sink, handle))
    }
}

impl ProgressSink for WebhookProgressSink {
    fn report(&self, event: &ProgressEvent) {
        if !self.throttle.lock().should_send(
            &event.stage,
            event.current,
            event.total,
            Instant::now(),
        ) {
            return;
        }

        let payload = WebhookPayload {
            job_id: self.job_id,
            stage: event.stage.clone(),
            current: event.current,
            total: event.total,
        };
        if self.tx.send(payload).is_err() {
            debug!(job_id = %self.job_id, "Webhook task gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn at(stage: &str, current: u64, total: u64) -> ProgressEvent {
        ProgressEvent::new(stage, current, total, Utc::now())
    }

    fn received(requests: &[wiremock::Request]) -> Vec<(String, u64, u64)> {
        requests
            .iter()
            .map(|r| {
                let body: WebhookPayload = serde_json::from_slice(&r.body).unwrap();
                (body.stage, body.current, body.total)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_webhook_posts_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/progress"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let job_id = JobId::new();
        let (sink, handle) = WebhookProgressSink::spawn(
            job_id,
            format!("{}/progress", server.uri()),
            Duration::ZERO,
            Duration::from_secs(5),
        )
        .unwrap();

        sink.report(&at("Layout", 0, 2));
        sink.report(&at("Layout", 1, 2));
        sink.report(&at("Layout", 2, 2));
        sink.report(&at("Tables", 0, 1));
        drop(sink);
        handle.await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(
            received(&requests),
            vec![
                ("Layout".to_string(), 0, 2),
                ("Layout".to_string(), 1, 2),
                ("Layout".to_string(), 2, 2),
                ("Tables".to_string(), 0, 1),
            ]
        );
        let first: WebhookPayload = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(first.job_id, job_id);
    }

    #[tokio::test]
    async fn test_webhook_throttles_middle_reports() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (sink, handle) = WebhookProgressSink::spawn(
            JobId::new(),
            server.uri(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .unwrap();

        for n in 0..=20 {
            sink.report(&at("OCR", n, 20));
        }
        drop(sink);
        handle.await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(
            received(&requests),
            vec![("OCR".to_string(), 0, 20), ("OCR".to_string(), 20, 20)]
        );
    }

    #[tokio::test]
    async fn test_webhook_failures_do_not_stop_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (sink, handle) = WebhookProgressSink::spawn(
            JobId::new(),
            server.uri(),
            Duration::ZERO,
            Duration::from_secs(5),
        )
        .unwrap();

        sink.report(&at("Pages", 0, 1));
        sink.report(&at("Pages", 1, 1));
        drop(sink);
        handle.await.unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[test]
    fn test_ipc_sinks_share_one_ordered_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let job_id = JobId::new();
        let sink = IpcProgressSink::new(job_id, tx.clone());
        let writer = IpcStatusWriter::new(job_id, 3, tx);

        writer.write(JobUpdate::processing());
        sink.report(&at("Pages", 0, 4));
        writer.write(JobUpdate::failed("boom"));

        assert!(matches!(
            rx.try_recv().unwrap(),
            CoordinatorMessage::StatusUpdate { epoch: 3, .. }
        ));
        match rx.try_recv().unwrap() {
            CoordinatorMessage::Progress { event, .. } => {
                assert_eq!((event.current, event.total), (0, 4))
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            CoordinatorMessage::StatusUpdate { .. }
        ));
    }
}
