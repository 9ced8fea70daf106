// Domain rules - Descriptor validation and compression planning

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::utils::path::PathUtils;

/// Output bitrates are never planned below this floor
pub const MIN_TARGET_BIT_RATE: u64 = 64_000;

/// Validate a descriptor and resolve its locations.
///
/// Only cheap checks run here; whether the source can actually be opened is
/// decided when the job starts.
pub fn validate(descriptor: &JobDescriptor) -> Result<ValidatedDescriptor, ValidationError> {
    DescriptorValidator::validate(descriptor)
}

/// Business rules for accepting a compression request
pub struct DescriptorValidator;

impl DescriptorValidator {
    pub fn validate(descriptor: &JobDescriptor) -> Result<ValidatedDescriptor, ValidationError> {
        if descriptor.source.trim().is_empty() {
            return Err(ValidationError::MissingField("source"));
        }
        if descriptor.destination.trim().is_empty() {
            return Err(ValidationError::MissingField("destination"));
        }
        if let Some(0) = descriptor.frame_rate {
            return Err(ValidationError::InvalidFrameRate(0));
        }

        let source = PathUtils::resolve(&descriptor.source).map_err(|_| {
            ValidationError::UnreadableSource {
                path: PathUtils::location_to_path(&descriptor.source),
            }
        })?;
        let destination = PathUtils::resolve(&descriptor.destination)
            .unwrap_or_else(|_| PathUtils::location_to_path(&descriptor.destination));

        if source == destination {
            return Err(ValidationError::SamePath(source));
        }

        Ok(ValidatedDescriptor {
            source,
            destination,
            requested_destination: PathUtils::location_to_path(&descriptor.destination),
            quality: VideoQuality::from_name(&descriptor.quality),
            frame_rate: descriptor.frame_rate,
            min_bitrate_check_enabled: descriptor.min_bitrate_check_enabled,
        })
    }
}

/// Limits applied when planning a compression
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    /// Bounding box width for the output (portrait orientation)
    pub max_width: u32,
    /// Bounding box height for the output (portrait orientation)
    pub max_height: u32,
    /// Sources at or below this bitrate are not worth compressing
    pub min_bit_rate: u64,
    /// Encoder threads
    pub threads: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_width: 720,
            max_height: 1280,
            min_bit_rate: 2_000_000,
            threads: CompressionPlanner::optimal_thread_count(),
        }
    }
}

/// Derives encoder settings from a request and the probed source
#[derive(Debug, Clone, Default)]
pub struct CompressionPlanner {
    settings: PlannerSettings,
}

impl CompressionPlanner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Build the compression plan for one job
    pub fn plan(
        &self,
        descriptor: &ValidatedDescriptor,
        media: &MediaInfo,
    ) -> Result<CompressionPlan, DomainError> {
        if descriptor.min_bitrate_check_enabled {
            self.check_min_bit_rate(media)?;
        }

        let dimensions = media.display_dimensions().and_then(|(width, height)| {
            Self::fit_dimensions(width, height, self.settings.max_width, self.settings.max_height)
        });

        Ok(CompressionPlan {
            source: descriptor.source.clone(),
            destination: descriptor.destination.clone(),
            quality: descriptor.quality,
            rate_control: Self::rate_control(descriptor.quality, media),
            dimensions,
            frame_rate: descriptor.frame_rate,
            threads: self.settings.threads,
        })
    }

    /// Reject sources whose bitrate leaves nothing to gain.
    ///
    /// An unknown bitrate passes: there is no evidence compression is useless.
    pub fn check_min_bit_rate(&self, media: &MediaInfo) -> Result<(), DomainError> {
        match media.effective_bit_rate() {
            Some(bit_rate) if bit_rate <= self.settings.min_bit_rate => {
                Err(DomainError::BitrateTooLow {
                    bitrate: bit_rate,
                    minimum: self.settings.min_bit_rate,
                })
            }
            _ => Ok(()),
        }
    }

    /// Target bitrate from the quality tier, or a CRF when the source rate is unknown
    pub fn rate_control(quality: VideoQuality, media: &MediaInfo) -> RateControl {
        match media.effective_bit_rate() {
            Some(bit_rate) => {
                let target = (bit_rate as f64 * quality.bitrate_factor()) as u64;
                RateControl::Bitrate(target.max(MIN_TARGET_BIT_RATE))
            }
            None => RateControl::Crf(quality.fallback_crf()),
        }
    }

    /// Fit `width`x`height` inside the bounding box, keeping the aspect ratio.
    ///
    /// The box follows the source orientation. Returns `None` when the source
    /// already fits; the result is never larger than the source and both
    /// sides are even.
    pub fn fit_dimensions(
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    ) -> Option<(u32, u32)> {
        if width == 0 || height == 0 || max_width == 0 || max_height == 0 {
            return None;
        }

        let long = max_width.max(max_height) as f64;
        let short = max_width.min(max_height) as f64;
        let (box_width, box_height) = if width >= height {
            (long, short)
        } else {
            (short, long)
        };

        let scale = (box_width / width as f64).min(box_height / height as f64);
        if scale >= 1.0 {
            return None;
        }

        // epsilon absorbs float error such as 3840 * (1280 / 3840) = 1279.999..
        let even = |value: f64| -> u32 { ((value / 2.0 + 1e-6).floor() as u32 * 2).max(2) };
        Some((even(width as f64 * scale), even(height as f64 * scale)))
    }

    /// Encoder threads: 75% of the cores, between 1 and 16
    pub fn optimal_thread_count() -> usize {
        let cpu_count = num_cpus::get();
        let optimal_threads = (cpu_count as f64 * 0.75).ceil() as usize;
        optimal_threads.clamp(1, 16)
    }
}
