//! FFmpeg process wrapper
//!
//! FFmpeg writes all of its diagnostics to stderr. If nobody drains that
//! pipe the OS buffer (usually 64KB) fills up and ffmpeg blocks forever,
//! so a dedicated thread reads stderr line by line for the whole life of
//! the process. The same thread optionally hands each line to a mirror
//! callback; the callback must not block.
//!
//! ```ignore
//! use gif_core::ffmpeg_process::FfmpegProcess;
//! use std::process::Command;
//!
//! let mut cmd = Command::new("ffmpeg");
//! cmd.arg("-version");
//!
//! let process = FfmpegProcess::spawn(&mut cmd, None)?;
//! let (status, stderr) = process.wait_with_output()?;
//! ```

use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Receives stderr lines in arrival order.
pub type LineSink = Box<dyn FnMut(&str) + Send>;

pub struct FfmpegProcess {
    child: Child,
    stderr_thread: Option<JoinHandle<String>>,
}

impl FfmpegProcess {
    /// Starts the process with stderr captured (and mirrored to `mirror`
    /// when given). stdout is discarded; stdin is closed.
    pub fn spawn(cmd: &mut Command, mirror: Option<LineSink>) -> io::Result<Self> {
        info!(command = ?cmd, "Executing FFmpeg command");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture FFmpeg stderr"))?;

        let stderr_thread = thread::Builder::new()
            .name("ffmpeg-stderr".into())
            .spawn(move || {
                let mut mirror = mirror;
                let mut buf = String::new();
                let reader = BufReader::new(stderr);
                for line in reader.split(b'\n').map_while(Result::ok) {
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim_end_matches('\r');
                    if let Some(sink) = mirror.as_mut() {
                        sink(line);
                    }
                    buf.push_str(line);
                    buf.push('\n');
                }
                buf
            })?;

        Ok(Self {
            child,
            stderr_thread: Some(stderr_thread),
        })
    }

    /// Waits for exit and returns the status with the full stderr text.
    pub fn wait_with_output(mut self) -> io::Result<(ExitStatus, String)> {
        let status = self.child.wait()?;
        let stderr = self
            .stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();

        if status.success() {
            info!(
                exit_code = status.code(),
                "FFmpeg process completed successfully"
            );
            debug!(stderr_output = %stderr, "FFmpeg stderr output");
        } else {
            error!(
                exit_code = status.code(),
                summary = %format_ffmpeg_error(&stderr),
                "FFmpeg process failed"
            );
        }

        Ok((status, stderr))
    }
}

/// Picks the most telling line of an ffmpeg stderr dump for log summaries.
///
/// The last line mentioning "error" wins; otherwise the last line that is
/// not a progress line; otherwise a generic message.
pub fn format_ffmpeg_error(stderr: &str) -> String {
    if let Some(error_line) = stderr
        .lines()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return error_line.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("frame=")
                && !trimmed.starts_with("fps=")
                && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown FFmpeg error".to_string())
}
