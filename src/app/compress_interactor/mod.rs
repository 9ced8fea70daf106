// Compress interactor - Runs one compression job and streams its events to a sink

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::engine::coordinator::CompressionCoordinator;
use crate::output::EventSink;

/// Interactor for the compress use case
pub struct CompressInteractor {
    coordinator: Arc<CompressionCoordinator>,
}

impl CompressInteractor {
    pub fn new(coordinator: Arc<CompressionCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<CompressionCoordinator> {
        &self.coordinator
    }

    /// Request cancellation of the job started by `execute`
    pub fn cancel(&self) -> bool {
        self.coordinator.cancel()
    }

    /// Start a job and forward its events to `sink` until it finishes.
    ///
    /// Rejections from `start` are returned as errors; anything that goes
    /// wrong after the job was accepted is reported through the outcome.
    pub async fn execute(
        &self,
        request: JobDescriptor,
        sink: &mut dyn EventSink,
    ) -> Result<Outcome, DomainError> {
        let mut stream = self.coordinator.subscribe();
        let handle = match self.coordinator.start(request) {
            Ok(handle) => handle,
            Err(e) => {
                self.coordinator.unsubscribe();
                return Err(e);
            }
        };
        info!(job = %handle.id(), engine = self.coordinator.codec_name(), "Job accepted");

        while let Some(event) = stream.recv().await {
            if let Err(e) = sink.event(&event) {
                warn!(error = %e, "Failed to render progress");
            }
            if event.is_terminal() {
                break;
            }
        }

        let outcome = self.coordinator.await_outcome(&handle).await;
        self.coordinator.unsubscribe();
        self.coordinator.dispose();

        if let Err(e) = sink.outcome(&outcome) {
            warn!(error = %e, "Failed to render outcome");
        }
        Ok(outcome)
    }
}
