//! Compression coordinator: one active job, a lifecycle state machine, and
//! a single terminal outcome per accepted start

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::{self, CompressionPlanner};
use crate::engine::progress::{JobReporter, ProgressChannel, ProgressStream};
use crate::ports::{AccessPort, CodecPort};

const WORKER_LOST: &str = "compression worker stopped unexpectedly";

/// Caller's reference to an accepted job
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    outcome: watch::Receiver<Option<Outcome>>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Outcome if the job already finished
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the terminal outcome
    pub async fn outcome(&self) -> Outcome {
        let mut rx = self.outcome.clone();
        let result = rx.wait_for(Option::is_some).await.map(|value| value.clone());
        match result {
            Ok(Some(outcome)) => outcome,
            _ => Outcome::Failure {
                reason: WORKER_LOST.to_string(),
            },
        }
    }
}

/// Point-in-time view of the current (or last) job
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub state: CoordinatorState,
    pub progress: f32,
    pub descriptor: ValidatedDescriptor,
    pub outcome: Option<Outcome>,
}

struct Job {
    id: JobId,
    descriptor: ValidatedDescriptor,
    reporter: Arc<JobReporter>,
    cancel: CancellationToken,
    outcome: Option<Outcome>,
}

struct Slot {
    state: CoordinatorState,
    job: Option<Job>,
}

impl Slot {
    fn transition(&mut self, next: CoordinatorState) -> Result<(), DomainError> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
        Ok(())
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs at most one compression job at a time
pub struct CompressionCoordinator {
    codec: Arc<dyn CodecPort>,
    access: Arc<dyn AccessPort>,
    planner: Arc<CompressionPlanner>,
    channel: Arc<ProgressChannel>,
    slot: Arc<Mutex<Slot>>,
    next_id: AtomicU64,
    runtime: Handle,
}

impl CompressionCoordinator {
    /// Create a coordinator that runs its jobs on the current tokio runtime
    pub fn new(
        codec: Arc<dyn CodecPort>,
        access: Arc<dyn AccessPort>,
        planner: CompressionPlanner,
    ) -> Result<Self, DomainError> {
        let runtime = Handle::try_current().map_err(|_| DomainError::NoRuntime)?;
        Ok(Self::with_runtime(codec, access, planner, runtime))
    }

    /// Create a coordinator that runs its jobs on `runtime`
    pub fn with_runtime(
        codec: Arc<dyn CodecPort>,
        access: Arc<dyn AccessPort>,
        planner: CompressionPlanner,
        runtime: Handle,
    ) -> Self {
        Self {
            codec,
            access,
            planner: Arc::new(planner),
            channel: Arc::new(ProgressChannel::new()),
            slot: Arc::new(Mutex::new(Slot {
                state: CoordinatorState::Idle,
                job: None,
            })),
            next_id: AtomicU64::new(1),
            runtime,
        }
    }

    /// Validate, authorize and launch a job. Returns without waiting for it.
    pub fn start(&self, descriptor: JobDescriptor) -> Result<JobHandle, DomainError> {
        let descriptor = rules::validate(&descriptor).map_err(|e| {
            warn!(error = %e, "Rejected compression request");
            e
        })?;
        self.authorize(&descriptor)?;

        let mut slot = lock_slot(&self.slot);
        if slot.state == CoordinatorState::Running {
            warn!("Rejected compression request: a job is already running");
            return Err(DomainError::AlreadyRunning);
        }
        if slot.state.is_terminal() {
            slot.transition(CoordinatorState::Idle)?;
            slot.job = None;
        }
        slot.transition(CoordinatorState::Running)?;

        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let reporter = Arc::new(JobReporter::new(id, Arc::clone(&self.channel)));
        let cancel = CancellationToken::new();
        let (outcome_tx, outcome_rx) = watch::channel(None);

        self.channel.activate(id);
        slot.job = Some(Job {
            id,
            descriptor: descriptor.clone(),
            reporter: Arc::clone(&reporter),
            cancel: cancel.clone(),
            outcome: None,
        });

        info!(
            job = %id,
            source = %descriptor.source.display(),
            destination = %descriptor.destination.display(),
            quality = %descriptor.quality,
            "Starting compression job"
        );

        let worker = JobWorker {
            id,
            descriptor,
            codec: Arc::clone(&self.codec),
            planner: Arc::clone(&self.planner),
            slot: Arc::clone(&self.slot),
            reporter,
            cancel,
            outcome_tx,
            finished: false,
        };
        let span = info_span!("job", id = %id);
        self.runtime.spawn(worker.run().instrument(span));

        Ok(JobHandle {
            id,
            outcome: outcome_rx,
        })
    }

    /// Request cooperative cancellation of the running job.
    ///
    /// A no-op when nothing is running. Returns whether a request was issued.
    pub fn cancel(&self) -> bool {
        let slot = lock_slot(&self.slot);
        match slot.job.as_ref() {
            Some(job) if slot.state == CoordinatorState::Running => {
                if !job.cancel.is_cancelled() {
                    info!(job = %job.id, "Cancellation requested");
                    job.cancel.cancel();
                }
                true
            }
            _ => {
                debug!("Ignoring cancel: no running job");
                false
            }
        }
    }

    /// Register the single progress subscriber, replacing any previous one
    pub fn subscribe(&self) -> ProgressStream {
        self.channel.subscribe()
    }

    pub fn unsubscribe(&self) {
        self.channel.unsubscribe();
    }

    /// Wait for the terminal outcome of `handle`'s job
    pub async fn await_outcome(&self, handle: &JobHandle) -> Outcome {
        handle.outcome().await
    }

    pub fn state(&self) -> CoordinatorState {
        lock_slot(&self.slot).state
    }

    pub fn snapshot(&self) -> Option<JobSnapshot> {
        let slot = lock_slot(&self.slot);
        slot.job.as_ref().map(|job| JobSnapshot {
            id: job.id,
            state: slot.state,
            progress: job.reporter.last_percent(),
            descriptor: job.descriptor.clone(),
            outcome: job.outcome.clone(),
        })
    }

    /// Acknowledge a finished job and return to `Idle`.
    ///
    /// Returns `false` (and changes nothing) unless the job is terminal.
    pub fn dispose(&self) -> bool {
        let mut slot = lock_slot(&self.slot);
        if !slot.state.is_terminal() {
            return false;
        }
        if slot.transition(CoordinatorState::Idle).is_err() {
            return false;
        }
        if let Some(job) = slot.job.take() {
            debug!(job = %job.id, "Disposed finished job");
        }
        true
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }

    fn authorize(&self, descriptor: &ValidatedDescriptor) -> Result<(), DomainError> {
        let resources = [
            Resource::Read(descriptor.source.clone()),
            Resource::Write(descriptor.destination.clone()),
        ];
        for resource in resources {
            if !self.access.has_access(&resource) {
                warn!(resource = ?resource, "Access denied");
                return Err(DomainError::AccessDenied {
                    path: resource.path().clone(),
                });
            }
        }
        Ok(())
    }
}

impl Drop for CompressionCoordinator {
    fn drop(&mut self) {
        let slot = lock_slot(&self.slot);
        if let Some(job) = slot.job.as_ref() {
            if slot.state == CoordinatorState::Running {
                job.cancel.cancel();
            }
        }
    }
}

/// Background side of one job
struct JobWorker {
    id: JobId,
    descriptor: ValidatedDescriptor,
    codec: Arc<dyn CodecPort>,
    planner: Arc<CompressionPlanner>,
    slot: Arc<Mutex<Slot>>,
    reporter: Arc<JobReporter>,
    cancel: CancellationToken,
    outcome_tx: watch::Sender<Option<Outcome>>,
    finished: bool,
}

impl JobWorker {
    async fn run(mut self) {
        let started = Instant::now();
        let outcome = self.execute().await;
        match &outcome {
            Outcome::Success { output_path } => info!(
                output = %output_path.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Compression succeeded"
            ),
            Outcome::Failure { reason } => warn!(%reason, "Compression failed"),
            Outcome::Cancelled => info!("Compression cancelled"),
        }
        self.finish(outcome);
    }

    async fn execute(&self) -> Outcome {
        let handle = match self.codec.open(&self.descriptor.source).await {
            Ok(handle) => handle,
            Err(e) => return Self::failure(e),
        };
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        let plan = match self.planner.plan(&self.descriptor, handle.info()) {
            Ok(plan) => plan,
            Err(e) => return Self::failure(e),
        };
        debug!(?plan, engine = self.codec.name(), "Compression planned");
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        let result = {
            let transcode = self
                .codec
                .transcode(&handle, &plan, self.reporter.as_ref());
            tokio::pin!(transcode);
            tokio::select! {
                result = &mut transcode => result,
                _ = self.cancel.cancelled() => {
                    debug!("Waiting for the engine to reach a segment boundary");
                    self.codec.cancel(&handle);
                    transcode.await
                }
            }
        };

        match result {
            // Output already moved into place; a late cancel cannot undo that
            Ok(_) => Outcome::Success {
                output_path: self.descriptor.requested_destination.clone(),
            },
            Err(CodecError::Interrupted) => Outcome::Cancelled,
            Err(_) if self.cancel.is_cancelled() => Outcome::Cancelled,
            Err(e) => Self::failure(e),
        }
    }

    fn failure(error: impl Into<DomainError>) -> Outcome {
        let error: DomainError = error.into();
        Outcome::Failure {
            reason: error.to_string(),
        }
    }

    /// Record the terminal state and deliver the outcome, exactly once
    fn finish(&mut self, outcome: Outcome) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut slot = lock_slot(&self.slot);
        if let Err(e) = slot.transition(outcome.state()) {
            error!(error = %e, "Job finished in an unexpected coordinator state");
        }
        if let Some(job) = slot.job.as_mut().filter(|job| job.id == self.id) {
            job.outcome = Some(outcome.clone());
        }
        self.reporter.finish(outcome.clone());
        self.outcome_tx.send_replace(Some(outcome));
    }
}

impl Drop for JobWorker {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Outcome::Failure {
                reason: WORKER_LOST.to_string(),
            });
        }
    }
}
