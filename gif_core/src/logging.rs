//! Tracing setup shared by the library and the CLI
//!
//! A daily-rolling file in the temp directory always receives records.
//! `RUST_LOG` overrides the configured level.
//!
//! # Examples
//!
//! ```no_run
//! use gif_core::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! init_logging("gif_maker", LogConfig::default()).expect("Failed to initialize logging");
//! info!("Program started");
//! ```

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Defaults to the system temp directory.
    pub log_dir: PathBuf,
    /// Log files kept after pruning.
    pub max_files: usize,
    pub level: Level,
    /// Also print records to stderr.
    pub stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: std::env::temp_dir(),
            max_files: 5,
            level: Level::INFO,
            stderr: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.log_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_stderr(mut self, enabled: bool) -> Self {
        self.stderr = enabled;
        self
    }
}

/// Default filter: this library plus the calling program at `level`.
fn default_filter(program_name: &str, level: Level) -> String {
    format!(
        "gif_core={level},{}={level}",
        program_name.replace('-', "_")
    )
}

/// Installs the global subscriber and prunes stale log files.
///
/// Records go to `{log_dir}/{program_name}.log.<date>`, and to stderr when
/// `config.stderr` is set. Fails if a subscriber is already installed.
pub fn init_logging(program_name: &str, config: LogConfig) -> Result<()> {
    let LogConfig {
        log_dir,
        max_files,
        level,
        stderr,
    } = config;

    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    let file_name = format!("{}.log", program_name);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(program_name, level)));

    let to_file = fmt::layer()
        .with_writer(RollingFileAppender::new(Rotation::DAILY, &log_dir, &file_name))
        .with_ansi(false)
        .with_thread_names(true)
        .with_line_number(true);
    let to_stderr = stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(to_file)
        .with(to_stderr)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!(
        program = program_name,
        ?log_dir,
        max_files,
        ?level,
        "Logging initialized"
    );
    cleanup_old_logs(&log_dir, program_name, max_files)
}

/// Deletes all but the `keep` most recent `{program_name}.log*` files.
fn cleanup_old_logs(log_dir: &Path, program_name: &str, keep: usize) -> Result<()> {
    let prefix = format!("{}.log", program_name);

    let mut logs: Vec<(SystemTime, PathBuf)> = std::fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory: {:?}", log_dir))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .filter_map(|entry| {
            let meta = entry.metadata().ok().filter(|m| m.is_file())?;
            Some((meta.modified().ok()?, entry.path()))
        })
        .collect();

    logs.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    for (_, stale) in logs.into_iter().skip(keep) {
        match std::fs::remove_file(&stale) {
            Ok(()) => tracing::debug!(path = ?stale, "Pruned log file"),
            Err(e) => tracing::warn!(path = ?stale, error = %e, "Could not prune log file"),
        }
    }
    Ok(())
}

/// Records one finished run of an external tool.
///
/// The full command line and wall time go to `info` (success) or `error`
/// (non-zero exit or killed by a signal). Captured output is attached to
/// failures and kept at `debug` for successful runs.
pub fn log_external_tool(
    tool_name: &str,
    args: &[OsString],
    output: &str,
    exit_code: Option<i32>,
    duration: Duration,
) {
    let command = std::iter::once(tool_name.into())
        .chain(args.iter().map(|a| a.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ");
    let secs = duration.as_secs_f64();

    match exit_code {
        Some(0) => {
            tracing::info!(tool = tool_name, %command, duration_secs = secs, "External tool finished");
            tracing::debug!(tool = tool_name, %output, "External tool output");
        }
        Some(code) => tracing::error!(
            tool = tool_name,
            %command,
            duration_secs = secs,
            exit_code = code,
            %output,
            "External tool exited with an error"
        ),
        None => tracing::error!(
            tool = tool_name,
            %command,
            duration_secs = secs,
            %output,
            "External tool was killed by a signal"
        ),
    }
}
