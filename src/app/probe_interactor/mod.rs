// Probe interactor - Reports what a source is and how it would be compressed

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::{self, CompressionPlanner};
use crate::ports::*;

/// Probed facts plus the plan a compression would use
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub media: MediaInfo,
    pub quality: VideoQuality,
    pub plan: Option<CompressionPlan>,
    /// Why no plan could be made (for example the min-bitrate check)
    pub plan_error: Option<String>,
}

/// Interactor for the probe use case
pub struct ProbeInteractor {
    codec_port: Arc<dyn CodecPort>,
    planner: CompressionPlanner,
}

impl ProbeInteractor {
    pub fn new(codec_port: Arc<dyn CodecPort>, planner: CompressionPlanner) -> Self {
        Self {
            codec_port,
            planner,
        }
    }

    /// Open `request.source` and plan it without writing anything
    pub async fn execute(&self, request: JobDescriptor) -> Result<ProbeReport, DomainError> {
        let request = if request.destination.trim().is_empty() {
            let destination = Self::suggested_destination(&request.source);
            JobDescriptor {
                destination: destination.to_string_lossy().into_owned(),
                ..request
            }
        } else {
            request
        };
        let descriptor = rules::validate(&request)?;

        info!(source = %descriptor.source.display(), engine = self.codec_port.name(), "Probing source");
        let handle = self.codec_port.open(&descriptor.source).await?;

        let (plan, plan_error) = match self.planner.plan(&descriptor, handle.info()) {
            Ok(plan) => (Some(plan), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Ok(ProbeReport {
            media: handle.info().clone(),
            quality: descriptor.quality,
            plan,
            plan_error,
        })
    }

    /// `clip.mp4` -> `clip-compressed.mp4`
    pub fn suggested_destination(source: &str) -> PathBuf {
        let path = crate::utils::path::PathUtils::location_to_path(source);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let name = match path.extension() {
            Some(ext) => format!("{}-compressed.{}", stem, ext.to_string_lossy()),
            None => format!("{}-compressed", stem),
        };
        path.with_file_name(name)
    }
}
