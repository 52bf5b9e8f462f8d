//! Per-job progress channels
//!
//! A channel is a FIFO of progress events for one job. It is created lazily by
//! whichever side touches it first and dropped by `ProgressChannels::clear`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::job::{JobId, ProgressSnapshot};

/// One progress observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: String,
    pub current: u64,
    pub total: u64,
    /// When the reporting stage opened; consumers derive elapsed time from it
    pub started_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        stage: impl Into<String>,
        current: u64,
        total: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage: stage.into(),
            current,
            total,
            started_at,
        }
    }

    /// Seconds since `started_at`, rounded to one decimal
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.started_at).num_milliseconds().max(0) as f64;
        (millis / 100.0).round() / 10.0
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            stage: self.stage.clone(),
            current: self.current,
            total: self.total,
        }
    }
}

/// FIFO of progress events for a single job
#[derive(Debug, Default)]
pub struct ProgressChannel {
    queue: Mutex<VecDeque<ProgressEvent>>,
    notify: Notify,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: ProgressEvent) {
        self.queue.lock().push_back(event);
        self.notify.notify_waiters();
    }

    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.queue.lock().pop_front()
    }

    /// Wait up to `timeout` for the next event
    pub async fn recv_timeout(&self, timeout: Duration) -> Option<ProgressEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register before checking the queue so a push in between still wakes us
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.try_recv() {
                return Some(event);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_recv();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// All live progress channels, keyed by job
#[derive(Debug, Default)]
pub struct ProgressChannels {
    channels: Mutex<HashMap<JobId, Arc<ProgressChannel>>>,
}

impl ProgressChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, job_id: &JobId) -> Arc<ProgressChannel> {
        self.channels
            .lock()
            .entry(*job_id)
            .or_insert_with(|| Arc::new(ProgressChannel::new()))
            .clone()
    }

    pub fn get(&self, job_id: &JobId) -> Option<Arc<ProgressChannel>> {
        self.channels.lock().get(job_id).cloned()
    }

    /// Release the job's channel. Returns whether one existed.
    pub fn clear(&self, job_id: &JobId) -> bool {
        self.channels.lock().remove(job_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }
}
