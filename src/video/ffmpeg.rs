use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::api::MediaProcessor;
use crate::error::{PipelineError, Result};

type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;
type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Runs a local `ffmpeg` binary inside a private working directory.
pub struct FfmpegProcessor {
    work_dir: PathBuf,
    binary: String,
    loaded: AtomicBool,
    on_progress: Option<ProgressFn>,
    on_log: Option<LogFn>,
}

impl FfmpegProcessor {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            binary: "ffmpeg".to_string(),
            loaded: AtomicBool::new(false),
            on_progress: None,
            on_log: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_progress(mut self, f: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn with_log(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_log = Some(Arc::new(f));
        self
    }

    fn progress(&self, fraction: f32) {
        if let Some(f) = &self.on_progress {
            f(fraction.clamp(0.0, 1.0));
        }
    }

    fn log(&self, message: &str) {
        debug!("ffmpeg: {}", message);
        if let Some(f) = &self.on_log {
            f(message);
        }
    }

    /// Resolves `name` inside the working directory; no absolute paths, no `..`.
    fn sandboxed(&self, name: &str) -> Result<PathBuf> {
        let path = Path::new(name);
        let plain = path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if name.is_empty() || !plain {
            return Err(PipelineError::media(format!("invalid file name: {}", name)));
        }
        Ok(self.work_dir.join(path))
    }

    fn ensure_loaded(&self) -> Result<()> {
        if !self.loaded.load(Ordering::Acquire) {
            return Err(PipelineError::media("media runtime not loaded"));
        }
        Ok(())
    }
}

/// Turns `-progress pipe:1` output into a completed fraction. The expected
/// length is the longest `Duration:` ffmpeg reports for its inputs.
#[derive(Debug, Default)]
struct ProgressTracker {
    duration_secs: f64,
    out_time_secs: f64,
}

impl ProgressTracker {
    fn log_line(&mut self, line: &str) {
        let Some(rest) = line.trim_start().strip_prefix("Duration:") else {
            return;
        };
        let stamp = rest.split(',').next().unwrap_or_default().trim();
        if let Some(secs) = parse_timestamp(stamp) {
            self.duration_secs = self.duration_secs.max(secs);
        }
    }

    fn progress_line(&mut self, line: &str) -> Option<f32> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // Both keys carry microseconds.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<u64>() {
                    self.out_time_secs = us as f64 / 1_000_000.0;
                }
                None
            }
            "progress" if value == "end" => Some(1.0),
            "progress" if self.duration_secs > 0.0 => {
                Some((self.out_time_secs / self.duration_secs).clamp(0.0, 1.0) as f32)
            }
            _ => None,
        }
    }
}

/// `HH:MM:SS.ss`; `N/A` and anything else gives `None`.
fn parse_timestamp(stamp: &str) -> Option<f64> {
    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn load_runtime(&self) -> Result<()> {
        if self.loaded.load(Ordering::Acquire) {
            return Ok(());
        }

        self.log("Loading FFmpeg...");
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let output = Command::new(&self.binary)
            .arg("-version")
            .output()
            .await
            .map_err(|e| PipelineError::media(format!("Failed to run FFmpeg: {}", e)))?;

        if !output.status.success() {
            return Err(PipelineError::media("FFmpeg is not usable"));
        }

        self.loaded.store(true, Ordering::Release);
        info!("FFmpeg loaded, working directory: {}", self.work_dir.display());
        Ok(())
    }

    async fn write_input(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_loaded()?;
        let path = self.sandboxed(name)?;
        tokio::fs::write(&path, bytes).await?;
        self.log(&format!("Wrote {} ({} bytes)", name, bytes.len()));
        Ok(())
    }

    async fn execute(&self, args: &[String]) -> Result<()> {
        self.ensure_loaded()?;
        self.progress(0.0);

        let mut child = Command::new(&self.binary)
            .args(["-y", "-nostats", "-progress", "pipe:1"])
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::media(format!("Failed to run FFmpeg: {}", e)))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(PipelineError::media("FFmpeg output pipes unavailable"));
        };
        let mut progress_lines = BufReader::new(stdout).lines();
        let mut log_lines = BufReader::new(stderr).lines();

        let mut tracker = ProgressTracker::default();
        let mut stderr_text = Vec::new();
        let (mut progress_open, mut log_open) = (true, true);

        while progress_open || log_open {
            tokio::select! {
                line = progress_lines.next_line(), if progress_open => match line {
                    Ok(Some(line)) => {
                        if let Some(fraction) = tracker.progress_line(&line) {
                            self.progress(fraction);
                        }
                    }
                    _ => progress_open = false,
                },
                line = log_lines.next_line(), if log_open => match line {
                    Ok(Some(line)) => {
                        tracker.log_line(&line);
                        self.log(&line);
                        stderr_text.push(line);
                    }
                    _ => log_open = false,
                },
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| PipelineError::media(format!("Failed to run FFmpeg: {}", e)))?;

        if !status.success() {
            return Err(PipelineError::media(format!(
                "FFmpeg command failed: {}",
                stderr_text.join("\n")
            )));
        }

        self.progress(1.0);
        Ok(())
    }

    async fn read_output(&self, name: &str) -> Result<Vec<u8>> {
        self.ensure_loaded()?;
        let path = self.sandboxed(name)?;
        Ok(tokio::fs::read(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_work_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let processor = FfmpegProcessor::new(dir.path());

        let err = processor.execute(&["-version".to_string()]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Media(_)));
        assert!(processor.write_input("input0.mp4", b"x").await.is_err());
    }

    #[tokio::test]
    async fn missing_binary_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let processor = FfmpegProcessor::new(dir.path()).with_binary("definitely-not-ffmpeg-here");

        assert!(matches!(processor.load_runtime().await, Err(PipelineError::Media(_))));
    }

    #[test]
    fn file_names_stay_inside_the_sandbox() {
        let processor = FfmpegProcessor::new("/tmp/work");
        assert!(processor.sandboxed("input0.mp4").is_ok());
        assert!(processor.sandboxed("../etc/passwd").is_err());
        assert!(processor.sandboxed("/etc/passwd").is_err());
        assert!(processor.sandboxed("").is_err());
    }

    #[tokio::test]
    async fn files_round_trip_once_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let processor = FfmpegProcessor::new(dir.path());
        // Skip the binary probe; only file plumbing is under test.
        processor.loaded.store(true, Ordering::Release);

        processor.write_input("mylist.txt", b"file 'input0.mp4'").await.unwrap();
        let back = processor.read_output("mylist.txt").await.unwrap();
        assert_eq!(back, b"file 'input0.mp4'");
    }

    #[test]
    fn progress_follows_out_time_against_input_duration() {
        let mut tracker = ProgressTracker::default();
        assert_eq!(tracker.progress_line("progress=continue"), None);

        tracker.log_line("  Duration: 00:00:08.00, start: 0.000000, bitrate: 1205 kb/s");
        tracker.log_line("  Duration: 00:00:16.00, start: 0.000000, bitrate: 128 kb/s");
        tracker.log_line("  Duration: N/A, bitrate: N/A");

        assert_eq!(tracker.progress_line("out_time_us=4000000"), None);
        assert_eq!(tracker.progress_line("progress=continue"), Some(0.25));
        tracker.progress_line("out_time_ms=20000000");
        assert_eq!(tracker.progress_line("progress=continue"), Some(1.0));
        assert_eq!(tracker.progress_line("progress=end"), Some(1.0));
    }

    #[test]
    fn timestamps_parse_to_seconds() {
        assert_eq!(parse_timestamp("01:02:03.50"), Some(3723.5));
        assert_eq!(parse_timestamp("N/A"), None);
        assert_eq!(parse_timestamp("1:2"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_progress_and_log_while_running() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &binary,
            "#!/bin/sh\n\
             echo '  Duration: 00:00:10.00, start: 0.000000' >&2\n\
             sleep 0.2\n\
             echo 'out_time_us=5000000'\n\
             echo 'progress=continue'\n\
             echo 'out_time_us=10000000'\n\
             echo 'progress=end'\n",
        )
        .unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let fractions = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let logs = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (f, l) = (fractions.clone(), logs.clone());
        let processor = FfmpegProcessor::new(dir.path())
            .with_binary(binary.to_string_lossy())
            .with_progress(move |x| f.lock().push(x))
            .with_log(move |line| l.lock().push(line.to_string()));
        processor.loaded.store(true, Ordering::Release);

        processor.execute(&["output.mp4".to_string()]).await.unwrap();

        let fractions = fractions.lock().clone();
        assert_eq!(fractions.first(), Some(&0.0));
        assert!(fractions.contains(&0.5));
        assert_eq!(fractions.last(), Some(&1.0));
        assert!(logs.lock().iter().any(|line| line.contains("Duration: 00:00:10.00")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_command_carries_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("fake-ffmpeg");
        std::fs::write(&binary, "#!/bin/sh\necho 'mylist.txt: No such file' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let processor = FfmpegProcessor::new(dir.path()).with_binary(binary.to_string_lossy());
        processor.loaded.store(true, Ordering::Release);

        let err = processor.execute(&["output.mp4".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("mylist.txt: No such file"));
    }
}
