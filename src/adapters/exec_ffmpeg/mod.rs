//! FFmpeg execution adapter
//!
//! Drives the `ffmpeg` binary as a subprocess. Progress comes from
//! `-progress pipe:1`; every `progress=` block is one work-unit boundary,
//! where interruption is checked.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::adapters::probe_ffprobe::FfprobeAdapter;
use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

/// Default time ffmpeg gets to finish after `q` before it is killed
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Accumulates `-progress` key=value lines into percentages
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    duration_us: Option<i64>,
    out_time_us: Option<i64>,
}

impl ProgressParser {
    pub fn new(duration: Option<Duration>) -> Self {
        Self {
            duration_us: duration.map(|d| d.as_micros() as i64).filter(|d| *d > 0),
            out_time_us: None,
        }
    }

    /// Feed one line. Returns a percentage at the end of each progress block.
    pub fn feed(&mut self, line: &str) -> Option<f32> {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("out_time_us=") {
            if let Ok(us) = value.parse::<i64>() {
                self.out_time_us = Some(us);
            }
            None
        } else if let Some(state) = line.strip_prefix("progress=") {
            if state == "end" {
                return Some(100.0);
            }
            let (out, total) = (self.out_time_us?, self.duration_us?);
            Some(((out as f64 / total as f64) * 100.0).clamp(0.0, 100.0) as f32)
        } else {
            None
        }
    }
}

/// FFmpeg-based codec engine
#[derive(Debug, Clone)]
pub struct FfmpegAdapter {
    ffmpeg: PathBuf,
    prober: FfprobeAdapter,
    video_codec: String,
    audio_codec: String,
    stop_timeout: Duration,
}

impl FfmpegAdapter {
    pub fn new(ffmpeg: impl Into<PathBuf>, prober: FfprobeAdapter) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            prober,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_codecs(mut self, video: impl Into<String>, audio: impl Into<String>) -> Self {
        self.video_codec = video.into();
        self.audio_codec = audio.into();
        self
    }

    /// Build the ffmpeg argument list writing `plan` to `output`
    pub fn build_args(&self, plan: &CompressionPlan, media: &MediaInfo, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-y", "-loglevel", "error", "-nostats"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(["-progress".to_string(), "pipe:1".to_string()]);
        args.push("-i".to_string());
        args.push(plan.source.to_string_lossy().into_owned());

        args.extend(["-c:v".to_string(), self.video_codec.clone()]);
        match plan.rate_control {
            RateControl::Bitrate(bit_rate) => {
                args.extend(["-b:v".to_string(), bit_rate.to_string()]);
            }
            RateControl::Crf(crf) => {
                args.extend(["-crf".to_string(), crf.to_string()]);
            }
        }
        if let Some((width, height)) = plan.dimensions {
            args.extend(["-vf".to_string(), format!("scale={}:{}", width, height)]);
        }
        if let Some(frame_rate) = plan.frame_rate {
            args.extend(["-r".to_string(), frame_rate.to_string()]);
        }
        args.extend(["-threads".to_string(), plan.threads.to_string()]);

        if media.has_audio {
            args.extend(["-c:a".to_string(), self.audio_codec.clone()]);
        } else {
            args.push("-an".to_string());
        }

        let extension = plan
            .destination
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase());
        if matches!(extension.as_deref(), Some("mp4" | "m4v" | "mov")) {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }

        args.push(output.to_string_lossy().into_owned());
        args
    }

    /// Ask ffmpeg to quit, killing it if it does not within the grace period
    async fn stop(&self, child: &mut Child) {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.flush().await;
        }
        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(_) => debug!("ffmpeg stopped"),
            Err(_) => {
                warn!("ffmpeg did not stop in time, killing it");
                let _ = child.kill().await;
            }
        }
    }
}

#[async_trait]
impl CodecPort for FfmpegAdapter {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn open(&self, source: &Path) -> Result<MediaHandle, CodecError> {
        let info = self.prober.probe(source).await?;
        Ok(MediaHandle::new(source.to_path_buf(), info))
    }

    async fn transcode(
        &self,
        handle: &MediaHandle,
        plan: &CompressionPlan,
        progress: &dyn ProgressCallback,
    ) -> Result<PathBuf, CodecError> {
        let directory = plan
            .destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let suffix = plan
            .destination
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        // Partial output lives in a temp file until ffmpeg exits cleanly
        let staging = tempfile::Builder::new()
            .prefix(".compressing-")
            .suffix(&suffix)
            .tempfile_in(directory)?;

        let args = self.build_args(plan, handle.info(), staging.path());
        debug!(ffmpeg = %self.ffmpeg.display(), ?args, "Spawning ffmpeg");

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CodecError::ToolUnavailable(self.ffmpeg.display().to_string())
                }
                _ => CodecError::Io(e.to_string()),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CodecError::Io("ffmpeg stdout unavailable".to_string()))?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            })
        });

        let mut parser = ProgressParser::new(handle.info().duration);
        let mut lines = BufReader::new(stdout).lines();
        progress.on_progress(0.0);

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(percent) = parser.feed(&line) {
                            if handle.is_interrupted() {
                                self.stop(&mut child).await;
                                return Err(CodecError::Interrupted);
                            }
                            progress.on_progress(percent);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => return Err(CodecError::Io(e.to_string())),
                },
                _ = handle.interrupted() => {
                    info!("Stopping ffmpeg");
                    self.stop(&mut child).await;
                    return Err(CodecError::Interrupted);
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if handle.is_interrupted() {
            return Err(CodecError::Interrupted);
        }
        if !status.success() {
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
                .unwrap_or_else(|| format!("ffmpeg exited with {}", status));
            return Err(CodecError::Transcode(reason));
        }

        staging
            .persist(&plan.destination)
            .map_err(|e| CodecError::Io(e.error.to_string()))?;
        progress.on_progress(100.0);
        Ok(plan.destination.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> CompressionPlan {
        CompressionPlan {
            source: PathBuf::from("/videos/a.mp4"),
            destination: PathBuf::from("/videos/b.mp4"),
            quality: VideoQuality::Medium,
            rate_control: RateControl::Bitrate(3_000_000),
            dimensions: Some((720, 1280)),
            frame_rate: Some(24),
            threads: 4,
        }
    }

    fn media(has_audio: bool) -> MediaInfo {
        MediaInfo {
            has_audio,
            ..Default::default()
        }
    }

    fn adapter() -> FfmpegAdapter {
        FfmpegAdapter::new("ffmpeg", FfprobeAdapter::default())
    }

    fn pair(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn test_progress_parser_emits_at_block_end() {
        let mut parser = ProgressParser::new(Some(Duration::from_secs(10)));
        assert_eq!(parser.feed("frame=12"), None);
        assert_eq!(parser.feed("out_time_us=2500000"), None);
        assert_eq!(parser.feed("progress=continue"), Some(25.0));
        assert_eq!(parser.feed("out_time_us=N/A"), None);
        assert_eq!(parser.feed("progress=continue"), Some(25.0));
        assert_eq!(parser.feed("out_time_us=12000000"), None);
        assert_eq!(parser.feed("progress=continue"), Some(100.0));
        assert_eq!(parser.feed("progress=end"), Some(100.0));
    }

    #[test]
    fn test_progress_parser_without_duration() {
        let mut parser = ProgressParser::new(None);
        parser.feed("out_time_us=1000");
        assert_eq!(parser.feed("progress=continue"), None);
        assert_eq!(parser.feed("progress=end"), Some(100.0));
    }

    #[test]
    fn test_build_args_bitrate_plan() {
        let args = adapter().build_args(&plan(), &media(true), Path::new("/videos/.tmp.mp4"));
        assert_eq!(pair(&args, "-i").as_deref(), Some("/videos/a.mp4"));
        assert_eq!(pair(&args, "-b:v").as_deref(), Some("3000000"));
        assert_eq!(pair(&args, "-vf").as_deref(), Some("scale=720:1280"));
        assert_eq!(pair(&args, "-r").as_deref(), Some("24"));
        assert_eq!(pair(&args, "-threads").as_deref(), Some("4"));
        assert_eq!(pair(&args, "-c:a").as_deref(), Some("aac"));
        assert_eq!(pair(&args, "-progress").as_deref(), Some("pipe:1"));
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/videos/.tmp.mp4"));
    }

    #[test]
    fn test_build_args_crf_without_audio() {
        let plan = CompressionPlan {
            rate_control: RateControl::Crf(27),
            dimensions: None,
            frame_rate: None,
            destination: PathBuf::from("/videos/b.mkv"),
            ..plan()
        };
        let args = adapter()
            .with_codecs("libx265", "libopus")
            .build_args(&plan, &media(false), Path::new("/videos/.tmp.mkv"));
        assert_eq!(pair(&args, "-crf").as_deref(), Some("27"));
        assert_eq!(pair(&args, "-c:v").as_deref(), Some("libx265"));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-vf".to_string()));
        assert!(!args.contains(&"-r".to_string()));
        assert!(!args.contains(&"+faststart".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.mp4");
        std::fs::write(&source, b"not really a video").unwrap();

        let adapter = FfmpegAdapter::new(
            "/nonexistent/ffmpeg-binary",
            FfprobeAdapter::new("/nonexistent/ffprobe-binary"),
        );
        let handle = MediaHandle::new(source.clone(), media(false));
        let plan = CompressionPlan {
            source,
            destination: dir.path().join("b.mp4"),
            ..plan()
        };

        struct Ignore;
        impl ProgressCallback for Ignore {
            fn on_progress(&self, _percent: f32) {}
        }

        let result = adapter.transcode(&handle, &plan, &Ignore).await;
        assert!(matches!(result, Err(CodecError::ToolUnavailable(_))));
        assert!(!dir.path().join("b.mp4").exists());
    }
    #[cfg(unix)]
    mod fake_binaries {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Mutex;
        use std::time::Instant;

        const PROBE_JSON: &str = r#"{"format":{"format_name":"mov","duration":"10.0","bit_rate":"8000000"},"streams":[{"codec_type":"video","width":1920,"height":1080}]}"#;

        #[derive(Default)]
        struct Recorder(Mutex<Vec<f32>>);

        impl ProgressCallback for Recorder {
            fn on_progress(&self, percent: f32) {
                self.0.lock().unwrap().push(percent);
            }
        }

        impl Recorder {
            fn values(&self) -> Vec<f32> {
                self.0.lock().unwrap().clone()
            }
        }

        struct Rig {
            _bin: tempfile::TempDir,
            media: tempfile::TempDir,
            adapter: FfmpegAdapter,
        }

        impl Rig {
            /// `ffmpeg_body` runs with the output path in `$out`
            fn new(ffmpeg_body: &str) -> Self {
                let bin = tempfile::tempdir().unwrap();
                let ffprobe = script(bin.path(), "ffprobe", &format!("echo '{}'", PROBE_JSON));
                let ffmpeg = script(
                    bin.path(),
                    "ffmpeg",
                    &format!("for out; do :; done\n{}", ffmpeg_body),
                );
                let media = tempfile::tempdir().unwrap();
                std::fs::write(media.path().join("a.mp4"), b"source").unwrap();
                Self {
                    adapter: FfmpegAdapter::new(ffmpeg, FfprobeAdapter::new(ffprobe)),
                    _bin: bin,
                    media,
                }
            }

            fn plan(&self) -> CompressionPlan {
                CompressionPlan {
                    source: self.media.path().join("a.mp4"),
                    destination: self.media.path().join("b.mp4"),
                    ..plan()
                }
            }

            fn files(&self) -> Vec<String> {
                let mut names: Vec<String> = std::fs::read_dir(self.media.path())
                    .unwrap()
                    .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                names
            }
        }

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_transcode_relays_progress_and_persists_output() {
            let rig = Rig::new(
                r#"printf compressed > "$out"
i=1
while [ $i -le 4 ]; do
  echo "out_time_us=$((i * 2500000))"
  echo "progress=continue"
  i=$((i + 1))
done
echo "progress=end""#,
            );
            let handle = rig.adapter.open(&rig.plan().source).await.unwrap();
            assert_eq!(handle.info().duration, Some(Duration::from_secs(10)));

            let recorder = Recorder::default();
            let written = rig
                .adapter
                .transcode(&handle, &rig.plan(), &recorder)
                .await
                .unwrap();

            assert_eq!(written, rig.plan().destination);
            assert_eq!(std::fs::read(&written).unwrap(), b"compressed");
            assert_eq!(
                recorder.values(),
                vec![0.0, 25.0, 50.0, 75.0, 100.0, 100.0, 100.0]
            );
            assert_eq!(rig.files(), vec!["a.mp4", "b.mp4"]);
        }

        #[tokio::test]
        async fn test_cancel_kills_unresponsive_ffmpeg_and_drops_staging() {
            let rig = Rig::new(
                r#"printf partial > "$out"
i=1
while [ $i -le 100 ]; do
  echo "out_time_us=$((i * 100000))"
  echo "progress=continue"
  sleep 0.05
  i=$((i + 1))
done
echo "progress=end""#,
            );
            let adapter = rig.adapter.clone().with_stop_timeout(Duration::from_millis(200));
            let handle = adapter.open(&rig.plan().source).await.unwrap();
            let recorder = Recorder::default();
            let plan = rig.plan();

            let started = Instant::now();
            let (result, _) = tokio::join!(adapter.transcode(&handle, &plan, &recorder), async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                adapter.cancel(&handle);
            });

            assert_eq!(result, Err(CodecError::Interrupted));
            assert!(started.elapsed() < Duration::from_secs(3));
            let values = recorder.values();
            assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
            assert!(values.last().copied().unwrap_or_default() < 100.0);
            assert_eq!(rig.files(), vec!["a.mp4"]);
        }

        #[tokio::test]
        async fn test_nonzero_exit_reports_last_stderr_line() {
            let rig = Rig::new(
                r#"printf partial > "$out"
echo "out_time_us=1000000"
echo "progress=continue"
echo "[mov,mp4] moov atom not found" >&2
echo "a.mp4: Invalid data found when processing input" >&2
echo "" >&2
exit 1"#,
            );
            let handle = rig.adapter.open(&rig.plan().source).await.unwrap();
            let recorder = Recorder::default();

            let result = rig.adapter.transcode(&handle, &rig.plan(), &recorder).await;
            assert_eq!(
                result,
                Err(CodecError::Transcode(
                    "a.mp4: Invalid data found when processing input".to_string()
                ))
            );
            assert_eq!(recorder.values(), vec![0.0, 10.0]);
            assert_eq!(rig.files(), vec!["a.mp4"]);
        }
    }
}
