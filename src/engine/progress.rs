//! Progress channel between the active job and its single subscriber
//!
//! Every event for the subscriber travels through one unbounded mpsc queue,
//! so the consumer sees them strictly in the order they were produced and
//! never concurrently. A job's [`JobReporter`] enforces the per-job rules:
//! percentages are clamped to [0, 100], never go backwards, and nothing is
//! delivered once the terminal outcome has been sent.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::domain::model::{JobId, Outcome, ProgressEvent};
use crate::ports::ProgressCallback;

/// Notification delivered to the subscriber
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CompressionEvent {
    /// The active job advanced
    Progress(ProgressEvent),
    /// The job reached its terminal outcome; always the job's last event
    Finished { job: JobId, outcome: Outcome },
}

impl CompressionEvent {
    pub fn job(&self) -> JobId {
        match self {
            CompressionEvent::Progress(event) => event.job,
            CompressionEvent::Finished { job, .. } => *job,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CompressionEvent::Finished { .. })
    }
}

/// Receiving end handed to the subscriber.
///
/// Ends (returns `None`) when the subscription is replaced or dropped.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<CompressionEvent>,
}

impl ProgressStream {
    /// Wait for the next event
    pub async fn recv(&mut self) -> Option<CompressionEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is already queued
    pub fn try_recv(&mut self) -> Option<CompressionEvent> {
        self.rx.try_recv().ok()
    }

    /// Collect events up to and including the next terminal event
    pub async fn collect_until_finished(&mut self) -> Vec<CompressionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

struct ChannelInner {
    sink: Option<mpsc::UnboundedSender<CompressionEvent>>,
    active: Option<JobId>,
}

/// Single-subscriber event conduit shared by the coordinator and its jobs
pub struct ProgressChannel {
    inner: Mutex<ChannelInner>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                sink: None,
                active: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        // The guarded data stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register the subscriber, replacing (and ending) any previous stream
    pub fn subscribe(&self) -> ProgressStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if inner.sink.replace(tx).is_some() {
            debug!("Replacing existing progress subscriber");
        }
        ProgressStream { rx }
    }

    /// Detach the current subscriber; its stream ends
    pub fn unsubscribe(&self) {
        self.lock().sink = None;
    }

    pub fn has_subscriber(&self) -> bool {
        self.lock()
            .sink
            .as_ref()
            .map(|sink| !sink.is_closed())
            .unwrap_or(false)
    }

    /// Route events of `job` from now on; events of any other job are dropped
    pub(crate) fn activate(&self, job: JobId) {
        self.lock().active = Some(job);
    }

    pub fn active_job(&self) -> Option<JobId> {
        self.lock().active
    }

    /// Forward an event to the subscriber. Returns whether it was delivered.
    pub(crate) fn deliver(&self, event: CompressionEvent) -> bool {
        let mut inner = self.lock();
        if inner.active != Some(event.job()) {
            trace!(job = %event.job(), "Dropping event from inactive job");
            return false;
        }
        if event.is_terminal() {
            inner.active = None;
        }

        let delivered = match inner.sink.as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        };
        if !delivered && inner.sink.is_some() {
            debug!("Progress subscriber went away");
            inner.sink = None;
        }
        delivered
    }
}

struct ReporterState {
    last: Option<f32>,
    sealed: bool,
}

/// Per-job progress gate, handed to the codec engine as its callback
pub struct JobReporter {
    job: JobId,
    channel: Arc<ProgressChannel>,
    state: Mutex<ReporterState>,
}

impl JobReporter {
    pub fn new(job: JobId, channel: Arc<ProgressChannel>) -> Self {
        Self {
            job,
            channel,
            state: Mutex::new(ReporterState {
                last: None,
                sealed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    /// Last percentage accepted for this job, 0.0 before the first tick
    pub fn last_percent(&self) -> f32 {
        self.lock().last.unwrap_or(0.0)
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Seal the reporter and deliver the terminal outcome.
    ///
    /// Returns `false` if the reporter was already sealed.
    pub fn finish(&self, outcome: Outcome) -> bool {
        let mut state = self.lock();
        if state.sealed {
            return false;
        }
        state.sealed = true;
        self.channel.deliver(CompressionEvent::Finished {
            job: self.job,
            outcome,
        });
        true
    }
}

impl ProgressCallback for JobReporter {
    fn on_progress(&self, percent: f32) {
        if !percent.is_finite() {
            return;
        }
        let percent = percent.clamp(0.0, 100.0);

        let mut state = self.lock();
        if state.sealed {
            return;
        }
        if matches!(state.last, Some(last) if percent <= last) {
            return;
        }
        state.last = Some(percent);
        self.channel.deliver(CompressionEvent::Progress(ProgressEvent {
            job: self.job,
            percent,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn percents(events: &[CompressionEvent]) -> Vec<f32> {
        events
            .iter()
            .filter_map(|event| match event {
                CompressionEvent::Progress(p) => Some(p.percent),
                _ => None,
            })
            .collect()
    }

    fn drain(stream: &mut ProgressStream) -> Vec<CompressionEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let channel = Arc::new(ProgressChannel::new());
        let mut stream = channel.subscribe();
        channel.activate(JobId(1));

        let reporter = JobReporter::new(JobId(1), Arc::clone(&channel));
        for percent in [-5.0, 10.0, 5.0, 10.0, 42.5, f32::NAN, 180.0, 99.0] {
            reporter.on_progress(percent);
        }

        let events = drain(&mut stream);
        assert_eq!(percents(&events), vec![0.0, 10.0, 42.5, 100.0]);
        assert_eq!(reporter.last_percent(), 100.0);
    }

    #[test]
    fn test_nothing_after_terminal_event() {
        let channel = Arc::new(ProgressChannel::new());
        let mut stream = channel.subscribe();
        channel.activate(JobId(7));

        let reporter = JobReporter::new(JobId(7), Arc::clone(&channel));
        reporter.on_progress(50.0);
        assert!(reporter.finish(Outcome::Cancelled));
        reporter.on_progress(75.0);
        assert!(!reporter.finish(Outcome::Cancelled));

        let events = drain(&mut stream);
        assert_eq!(events.len(), 2);
        assert!(events[1].is_terminal());
        assert!(reporter.is_sealed());
        assert_eq!(channel.active_job(), None);
    }

    #[test]
    fn test_events_from_inactive_job_are_dropped() {
        let channel = Arc::new(ProgressChannel::new());
        let mut stream = channel.subscribe();
        channel.activate(JobId(2));

        let stale = JobReporter::new(JobId(1), Arc::clone(&channel));
        let active = JobReporter::new(JobId(2), Arc::clone(&channel));
        stale.on_progress(90.0);
        active.on_progress(10.0);

        let events = drain(&mut stream);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].job(), JobId(2));
    }

    #[test]
    fn test_new_subscription_ends_previous_stream() {
        let channel = Arc::new(ProgressChannel::new());
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();
        channel.activate(JobId(3));

        JobReporter::new(JobId(3), Arc::clone(&channel)).on_progress(1.0);

        assert!(first.try_recv().is_none());
        assert_eq!(drain(&mut second).len(), 1);
        assert!(channel.has_subscriber());
    }

    #[test]
    fn test_unsubscribe_detaches_consumer() {
        let channel = Arc::new(ProgressChannel::new());
        let _stream = channel.subscribe();
        assert!(channel.has_subscriber());

        channel.unsubscribe();
        assert!(!channel.has_subscriber());

        channel.activate(JobId(4));
        assert!(!channel.deliver(CompressionEvent::Progress(ProgressEvent {
            job: JobId(4),
            percent: 1.0,
        })));
    }

    #[test]
    fn test_dropped_stream_clears_sink() {
        let channel = Arc::new(ProgressChannel::new());
        drop(channel.subscribe());
        channel.activate(JobId(5));

        let reporter = JobReporter::new(JobId(5), Arc::clone(&channel));
        reporter.on_progress(20.0);
        assert!(!channel.has_subscriber());
        assert_eq!(reporter.last_percent(), 20.0);
    }

    #[tokio::test]
    async fn test_collect_until_finished_stops_at_terminal() {
        let channel = Arc::new(ProgressChannel::new());
        let mut stream = channel.subscribe();
        channel.activate(JobId(6));

        let reporter = JobReporter::new(JobId(6), Arc::clone(&channel));
        reporter.on_progress(30.0);
        reporter.finish(Outcome::Success {
            output_path: PathBuf::from("b.mp4"),
        });

        let events = stream.collect_until_finished().await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events.last(),
            Some(&CompressionEvent::Finished {
                job: JobId(6),
                outcome: Outcome::Success {
                    output_path: PathBuf::from("b.mp4")
                }
            })
        );
    }

    #[test]
    fn test_event_json_shape() {
        let event = CompressionEvent::Progress(ProgressEvent {
            job: JobId(1),
            percent: 12.5,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["percent"], 12.5);

        let event = CompressionEvent::Finished {
            job: JobId(1),
            outcome: Outcome::Cancelled,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "finished");
        assert_eq!(json["outcome"]["status"], "cancelled");
    }
}
