//! Rendering of compression events, outcomes and probe reports

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;

use crate::app::probe_interactor::ProbeReport;
use crate::domain::model::Outcome;
use crate::engine::progress::CompressionEvent;
use crate::utils::Utils;

/// Destination for the events of one job
pub trait EventSink: Send {
    /// Render one event as it arrives
    fn event(&mut self, event: &CompressionEvent) -> io::Result<()>;

    /// Render the final response once the job is over
    fn outcome(&mut self, outcome: &Outcome) -> io::Result<()>;
}

/// Human-readable progress bar plus the response body
pub struct ConsoleRenderer<W: Write> {
    out: W,
    last_whole_percent: Option<u32>,
    width: usize,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_whole_percent: None,
            width: 30,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn bar(&self, percent: f32) -> String {
        let filled = ((percent / 100.0) * self.width as f32).round() as usize;
        let filled = filled.min(self.width);
        format!("[{}{}]", "#".repeat(filled), " ".repeat(self.width - filled))
    }
}

impl<W: Write + Send> EventSink for ConsoleRenderer<W> {
    fn event(&mut self, event: &CompressionEvent) -> io::Result<()> {
        match event {
            CompressionEvent::Progress(progress) => {
                // Redraw only when the whole percentage changes
                let whole = progress.percent.floor() as u32;
                if self.last_whole_percent == Some(whole) {
                    return Ok(());
                }
                self.last_whole_percent = Some(whole);
                write!(self.out, "\r{} {:>5.1}%", self.bar(progress.percent), progress.percent)?;
                self.out.flush()
            }
            CompressionEvent::Finished { .. } => {
                if self.last_whole_percent.is_some() {
                    writeln!(self.out)?;
                }
                Ok(())
            }
        }
    }

    fn outcome(&mut self, outcome: &Outcome) -> io::Result<()> {
        writeln!(self.out, "{}", outcome.response_body())?;
        self.out.flush()
    }
}

#[derive(Serialize)]
struct Timestamped<'a, T: Serialize> {
    timestamp: String,
    #[serde(flatten)]
    inner: &'a T,
}

/// One JSON object per line, each with an RFC 3339 timestamp
pub struct JsonLinesRenderer<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        let record = Timestamped {
            timestamp: Utc::now().to_rfc3339(),
            inner: value,
        };
        serde_json::to_writer(&mut self.out, &record)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

impl<W: Write + Send> EventSink for JsonLinesRenderer<W> {
    fn event(&mut self, event: &CompressionEvent) -> io::Result<()> {
        self.line(event)
    }

    fn outcome(&mut self, outcome: &Outcome) -> io::Result<()> {
        self.line(&outcome.response_body())
    }
}

/// Plain-text probe report
pub fn format_probe_report(report: &ProbeReport) -> String {
    let media = &report.media;
    let mut text = String::new();
    text.push_str("Media File Information:\n");
    text.push_str(&format!("  File: {}\n", media.path.display()));
    text.push_str(&format!(
        "  Container: {}\n",
        media.container.as_deref().unwrap_or("unknown")
    ));
    if let Some(duration) = media.duration {
        text.push_str(&format!("  Duration: {}\n", Utils::format_duration(duration)));
    }
    text.push_str(&format!("  File Size: {}\n", Utils::format_file_size(media.file_size)));
    if let Some(bit_rate) = media.effective_bit_rate() {
        text.push_str(&format!("  Bitrate: {}\n", Utils::format_bit_rate(bit_rate)));
    }
    if let Some((width, height)) = media.display_dimensions() {
        text.push_str(&format!("  Dimensions: {}x{}\n", width, height));
    }
    if let Some(frame_rate) = media.frame_rate {
        text.push_str(&format!("  Frame Rate: {:.2} fps\n", frame_rate));
    }
    text.push_str(&format!("  Audio: {}\n", if media.has_audio { "yes" } else { "no" }));

    text.push_str(&format!("\nCompression Plan ({}):\n", report.quality));
    match (&report.plan, &report.plan_error) {
        (Some(plan), _) => {
            match plan.rate_control {
                crate::domain::model::RateControl::Bitrate(bit_rate) => {
                    text.push_str(&format!("  Target Bitrate: {}\n", Utils::format_bit_rate(bit_rate)))
                }
                crate::domain::model::RateControl::Crf(crf) => {
                    text.push_str(&format!("  CRF: {}\n", crf))
                }
            }
            match plan.dimensions {
                Some((width, height)) => {
                    text.push_str(&format!("  Output Dimensions: {}x{}\n", width, height))
                }
                None => text.push_str("  Output Dimensions: unchanged\n"),
            }
            text.push_str(&format!("  Threads: {}\n", plan.threads));
        }
        (None, Some(reason)) => text.push_str(&format!("  Not compressible: {}\n", reason)),
        (None, None) => text.push_str("  No plan\n"),
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{JobId, ProgressEvent};
    use std::path::PathBuf;

    fn progress(percent: f32) -> CompressionEvent {
        CompressionEvent::Progress(ProgressEvent {
            job: JobId(1),
            percent,
        })
    }

    #[test]
    fn test_console_renders_bar_and_response_body() {
        let mut renderer = ConsoleRenderer::new(Vec::new());
        renderer.event(&progress(0.0)).unwrap();
        renderer.event(&progress(50.2)).unwrap();
        renderer.event(&progress(50.7)).unwrap();
        renderer
            .event(&CompressionEvent::Finished {
                job: JobId(1),
                outcome: Outcome::Cancelled,
            })
            .unwrap();
        renderer.outcome(&Outcome::Cancelled).unwrap();

        let text = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(text.matches('\r').count(), 2);
        assert!(text.contains(" 50.2%"));
        assert!(text.ends_with("{\"onCancelled\":true}\n"));
    }

    #[test]
    fn test_json_lines_are_timestamped() {
        let mut renderer = JsonLinesRenderer::new(Vec::new());
        renderer.event(&progress(12.5)).unwrap();
        renderer
            .outcome(&Outcome::Success {
                output_path: PathBuf::from("b.mp4"),
            })
            .unwrap();

        let text = String::from_utf8(renderer.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "progress");
        assert_eq!(lines[0]["percent"], 12.5);
        assert!(lines[0]["timestamp"].is_string());
        assert_eq!(lines[1]["onSuccess"], "b.mp4");
    }
}
