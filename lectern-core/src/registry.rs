//! In-memory job registry
//!
//! Single source of truth for job status. Every mutation happens under one
//! mutex as a copy-merge-replace of the whole record, so readers only ever see
//! complete snapshots. The registry also enforces the status lattice: terminal
//! records are immutable and status never moves backwards.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::job::{JobId, JobRecord, JobStatus, JobUpdate};
use crate::types::OutputFormat;

/// Why an update was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The record already reached this terminal status
    Terminal(JobStatus),
    /// The requested status would move the record backwards
    Regression { from: JobStatus, to: JobStatus },
    /// The writer was started under an older epoch
    StaleEpoch { current: u64, given: u64 },
    /// `html_ready` requested for a format without previews
    PreviewUnsupported(OutputFormat),
}

/// Result of an update call
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Merged; carries the record as stored afterwards
    Applied(Box<JobRecord>),
    /// No record with that id
    Missing,
    Rejected(RejectReason),
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }
}

/// Lock-protected map of job id to job record
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `pending` record
    pub fn create(
        &self,
        job_id: JobId,
        file_id: impl Into<String>,
        output_format: OutputFormat,
    ) -> Result<JobRecord> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&job_id) {
            return Err(RegistryError::AlreadyExists(job_id));
        }
        let record = JobRecord::new(job_id, file_id, output_format);
        jobs.insert(job_id, record.clone());
        debug!(%job_id, "Job registered");
        Ok(record)
    }

    /// Snapshot of the record, if present
    pub fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.jobs.lock().get(job_id).cloned()
    }

    /// Merge `update` into the record
    pub fn update(&self, job_id: &JobId, update: JobUpdate) -> UpdateOutcome {
        self.apply(job_id, None, update)
    }

    /// Merge `update` only if `epoch` is still the record's current epoch
    pub fn update_fenced(&self, job_id: &JobId, epoch: u64, update: JobUpdate) -> UpdateOutcome {
        self.apply(job_id, Some(epoch), update)
    }

    /// Bump the record's epoch, invalidating writers started before this call
    pub fn fence(&self, job_id: &JobId) -> Result<u64> {
        let mut jobs = self.jobs.lock();
        let record = jobs
            .get_mut(job_id)
            .ok_or(RegistryError::NotFound(*job_id))?;
        record.epoch += 1;
        Ok(record.epoch)
    }

    pub fn remove(&self, job_id: &JobId) -> Option<JobRecord> {
        self.jobs.lock().remove(job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Number of records per status
    pub fn status_counts(&self) -> HashMap<JobStatus, usize> {
        let jobs = self.jobs.lock();
        let mut counts = HashMap::new();
        for record in jobs.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }

    /// Drop terminal records that finished more than `older_than` ago
    pub fn evict_finished(&self, older_than: Duration) -> Vec<JobId> {
        let Ok(age) = chrono::Duration::from_std(older_than) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - age;

        let mut jobs = self.jobs.lock();
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|r| r.finished_at.is_some_and(|t| t <= cutoff))
            .map(|r| r.job_id)
            .collect();
        for job_id in &expired {
            jobs.remove(job_id);
        }
        expired
    }

    fn apply(&self, job_id: &JobId, epoch: Option<u64>, update: JobUpdate) -> UpdateOutcome {
        let mut jobs = self.jobs.lock();
        let Some(current) = jobs.get(job_id) else {
            return UpdateOutcome::Missing;
        };

        if let Some(given) = epoch {
            if given != current.epoch {
                return UpdateOutcome::Rejected(RejectReason::StaleEpoch {
                    current: current.epoch,
                    given,
                });
            }
        }

        if current.status.is_terminal() {
            return UpdateOutcome::Rejected(RejectReason::Terminal(current.status));
        }

        if let Some(next) = update.status {
            if !current.status.can_transition_to(next) {
                return UpdateOutcome::Rejected(RejectReason::Regression {
                    from: current.status,
                    to: next,
                });
            }
            if next == JobStatus::HtmlReady && !current.output_format.supports_preview() {
                return UpdateOutcome::Rejected(RejectReason::PreviewUnsupported(
                    current.output_format,
                ));
            }
        }

        let mut next = current.clone();
        update.apply_to(&mut next);
        let now = Utc::now();
        next.updated_at = now;
        if next.status.is_terminal() {
            next.finished_at = Some(now);
        }

        jobs.insert(*job_id, next.clone());
        UpdateOutcome::Applied(Box::new(next))
    }
}
