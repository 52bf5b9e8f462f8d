//! Progress sinks and the stage-scoped reporter handed to converters

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::progress::{ProgressChannel, ProgressEvent};

/// Destination for progress reports.
///
/// Each event carries the `started_at` of the stage that produced it.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Discards every report
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Pushes reports into an in-process channel
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    channel: Arc<ProgressChannel>,
}

impl ChannelProgressSink {
    pub fn new(channel: Arc<ProgressChannel>) -> Self {
        Self { channel }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn report(&self, event: &ProgressEvent) {
        self.channel.push(event.clone());
    }
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    reports: Mutex<Vec<(String, u64, u64)>>,
    started: Mutex<Vec<DateTime<Utc>>>,
}

impl RecordingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, u64, u64)> {
        self.reports.lock().clone()
    }

    /// `started_at` of every report, in order
    pub fn start_times(&self) -> Vec<DateTime<Utc>> {
        self.started.lock().clone()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn report(&self, event: &ProgressEvent) {
        self.reports
            .lock()
            .push((event.stage.clone(), event.current, event.total));
        self.started.lock().push(event.started_at);
    }
}

/// Hands out stage trackers bound to one sink
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink }
    }

    /// Open a stage. Emits `(0, total)` right away when `total > 0`; a
    /// stage with no total reports nothing at all.
    pub fn stage(&self, label: impl Into<String>, total: u64) -> StageProgress {
        StageProgress::open(self.sink.clone(), label.into(), total)
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

/// Progress of one named stage.
///
/// `current` never decreases and never exceeds `total`. Closing the stage,
/// explicitly or on drop, reports `(total, total)` unless that was already
/// the last report. A stage opened with `total == 0` is untracked and never
/// reports.
pub struct StageProgress {
    sink: Arc<dyn ProgressSink>,
    label: String,
    started_at: DateTime<Utc>,
    total: u64,
    current: u64,
    last: Option<(u64, u64)>,
    closed: bool,
}

impl StageProgress {
    fn open(sink: Arc<dyn ProgressSink>, label: String, total: u64) -> Self {
        let mut stage = Self {
            sink,
            label,
            started_at: Utc::now(),
            total,
            current: 0,
            last: None,
            closed: false,
        };
        if total > 0 {
            stage.emit(0);
        }
        stage
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Move forward by `n` units
    pub fn advance(&mut self, n: u64) {
        self.set(self.current.saturating_add(n));
    }

    /// Report an absolute position, clamped into `[current, total]`
    pub fn set(&mut self, position: u64) {
        if self.total == 0 {
            return;
        }
        let next = position.max(self.current).min(self.total);
        if Some((next, self.total)) == self.last {
            return;
        }
        self.current = next;
        self.emit(next);
    }

    pub fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = self.total;
        if self.total > 0 && self.last != Some((self.total, self.total)) {
            self.emit(self.total);
        }
    }

    fn emit(&mut self, current: u64) {
        let event = ProgressEvent::new(self.label.as_str(), current, self.total, self.started_at);
        self.sink.report(&event);
        self.last = Some((current, self.total));
    }
}

impl Drop for StageProgress {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> (ProgressReporter, Arc<RecordingProgressSink>) {
        let sink = Arc::new(RecordingProgressSink::new());
        (ProgressReporter::new(sink.clone()), sink)
    }

    fn currents(sink: &RecordingProgressSink) -> Vec<(u64, u64)> {
        sink.reports().into_iter().map(|(_, c, t)| (c, t)).collect()
    }

    #[test]
    fn test_stage_reports_open_steps_and_close_once() {
        let (reporter, sink) = reporter();
        let mut stage = reporter.stage("Converting pages", 3);
        for _ in 0..3 {
            stage.advance(1);
        }
        stage.finish();

        assert_eq!(currents(&sink), vec![(0, 3), (1, 3), (2, 3), (3, 3)]);
        assert!(sink.reports().iter().all(|(s, _, _)| s == "Converting pages"));
    }

    #[test]
    fn test_stage_close_on_drop_fills_to_total() {
        let (reporter, sink) = reporter();
        {
            let mut stage = reporter.stage("Rendering", 4);
            stage.advance(1);
        }
        assert_eq!(currents(&sink), vec![(0, 4), (1, 4), (4, 4)]);
    }

    #[test]
    fn test_stage_clamps_and_never_regresses() {
        let (reporter, sink) = reporter();
        let mut stage = reporter.stage("Layout", 5);
        stage.set(3);
        stage.set(1);
        stage.set(9);
        stage.advance(2);
        assert_eq!(stage.current(), 5);
        drop(stage);

        assert_eq!(currents(&sink), vec![(0, 5), (3, 5), (5, 5)]);
    }

    #[test]
    fn test_zero_total_stage_reports_nothing() {
        let (reporter, sink) = reporter();
        let stage = reporter.stage("Warmup", 0);
        stage.finish();
        assert!(sink.reports().is_empty());
    }

    #[test]
    fn test_zero_total_stage_ignores_updates() {
        let (reporter, sink) = reporter();
        let mut stage = reporter.stage("Warmup", 0);
        stage.set(4);
        stage.advance(2);
        assert_eq!(stage.current(), 0);
        stage.finish();
        assert!(sink.reports().is_empty());
    }

    #[test]
    fn test_each_stage_has_its_own_start_time() {
        let (reporter, sink) = reporter();
        reporter.stage("Layout", 1).finish();
        std::thread::sleep(std::time::Duration::from_millis(5));
        reporter.stage("Tables", 1).finish();

        let starts = sink.start_times();
        assert_eq!(starts.len(), 4);
        assert_eq!(starts[0], starts[1]);
        assert_eq!(starts[2], starts[3]);
        assert!(starts[2] > starts[1]);
    }

    #[test]
    fn test_channel_sink_forwards_stage_start_time() {
        let channel = Arc::new(ProgressChannel::new());
        let reporter = ProgressReporter::new(Arc::new(ChannelProgressSink::new(channel.clone())));
        let before = Utc::now();
        let mut stage = reporter.stage("OCR", 2);
        stage.advance(1);

        let opened = channel.try_recv().unwrap();
        let stepped = channel.try_recv().unwrap();
        assert!(opened.started_at >= before);
        assert_eq!(opened.started_at, stepped.started_at);
        assert_eq!((stepped.current, stepped.total), (1, 2));
    }
}
