//! Command implementations

use std::io;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::app::container::{AppContainer, DefaultAppContainer};
use crate::cli::args::{CompressArgs, ProbeArgs};
use crate::cli::{EXIT_CANCELLED, EXIT_FAILURE, EXIT_SUCCESS};
use crate::domain::model::{JobDescriptor, Outcome};
use crate::output::{format_probe_report, ConsoleRenderer, EventSink, JsonLinesRenderer};

/// Execute the compress command, returning the process exit code
pub async fn compress(container: &DefaultAppContainer, args: CompressArgs) -> Result<i32> {
    let interactor = container.compress_interactor();

    let mut request = JobDescriptor::new(args.source, args.destination)
        .with_quality(args.quality)
        .with_min_bitrate_check(args.min_bitrate_check);
    request.frame_rate = args.frame_rate;

    // Ctrl-C asks the running job to stop at its next segment boundary
    let canceller = interactor.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            canceller.cancel();
        }
    });

    let mut sink: Box<dyn EventSink> = if args.json {
        Box::new(JsonLinesRenderer::new(io::stdout()))
    } else {
        Box::new(ConsoleRenderer::new(io::stdout()))
    };

    let result = interactor.execute(request, sink.as_mut()).await;
    ctrl_c.abort();

    match result {
        Ok(outcome) => Ok(exit_code(&outcome)),
        Err(e) => {
            error!(error = %e, "Compression request rejected");
            sink.outcome(&Outcome::Failure {
                reason: e.to_string(),
            })
            .context("Failed to write response")?;
            Ok(EXIT_FAILURE)
        }
    }
}

/// Execute the probe command
pub async fn probe(container: &DefaultAppContainer, args: ProbeArgs) -> Result<i32> {
    let request = JobDescriptor::new(args.source, "")
        .with_quality(args.quality)
        .with_min_bitrate_check(args.min_bitrate_check);

    let report = container
        .probe_interactor()
        .execute(request)
        .await
        .context("Failed to probe source")?;
    info!(path = %report.media.path.display(), "Probe finished");

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize probe report")?
        );
    } else {
        print!("{}", format_probe_report(&report));
    }
    Ok(EXIT_SUCCESS)
}

pub fn exit_code(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Success { .. } => EXIT_SUCCESS,
        Outcome::Failure { .. } => EXIT_FAILURE,
        Outcome::Cancelled => EXIT_CANCELLED,
    }
}
