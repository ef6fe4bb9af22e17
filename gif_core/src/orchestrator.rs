//! Two-phase encoder invocation
//!
//! ```text
//! Idle → PaletteGenerating → Rendering → Done(success)
//!              │                 │
//!              └──────┬──────────┘
//!                     ▼
//!               Done(failure) → Idle
//! ```
//!
//! Phase 1 runs `palettegen` into a transient PNG, phase 2 runs
//! `paletteuse` with that PNG as a second input. The palette (and the
//! concat list for explicit file selections) are [`ScopedArtifact`]s:
//! they are deleted when the request's stack frame unwinds, whichever way
//! it unwinds.

use crate::errors::{GifError, Result};
use crate::ffmpeg_process::{FfmpegProcess, LineSink};
use crate::input::{write_concat_list, InputSelection};
use crate::logging::log_external_tool;
use crate::metadata::{CaptureDateReader, NoMetadata};
use crate::request::ConversionRequest;
use serde::Serialize;
use std::cell::Cell;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::io::{self, BufWriter};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Palette,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Palette => write!(f, "palette"),
            Stage::Render => write!(f, "render"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    Idle,
    PaletteGenerating,
    Rendering,
    Done { success: bool },
}

impl ConversionState {
    /// Stage a fault in this state is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            ConversionState::Rendering => Stage::Render,
            _ => Stage::Palette,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Succeeded { output: PathBuf },
    Failed { stage: Stage, diagnostic: String },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Succeeded { .. })
    }

    fn from_error(err: GifError, fallback: Stage) -> Self {
        match err {
            GifError::EncodePhaseFailed {
                stage, diagnostic, ..
            } => ConversionOutcome::Failed { stage, diagnostic },
            other => ConversionOutcome::Failed {
                stage: fallback,
                diagnostic: other.to_string(),
            },
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ConversionOutcome::Succeeded { output } => format!("✅ Created {}", output.display()),
            ConversionOutcome::Failed { stage, diagnostic } => GifError::EncodePhaseFailed {
                stage: *stage,
                exit_code: None,
                diagnostic: diagnostic.clone(),
            }
            .user_message(),
        }
    }
}

/// Everything the worker reports back to the foreground.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    State(ConversionState),
    /// Coarse progress: 0, 50, 100.
    Progress(u8),
    Log { stage: Stage, line: String },
    Finished(ConversionOutcome),
}

// ═══════════════════════════════════════════════════════════════
// Encoder runner
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

/// Runs one encoder invocation to completion.
pub trait EncoderRunner: Send + Sync {
    fn run(&self, stage: Stage, args: &[OsString], mirror: Option<LineSink>)
        -> io::Result<PhaseOutput>;
}

#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
}

impl FfmpegRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl EncoderRunner for FfmpegRunner {
    fn run(
        &self,
        stage: Stage,
        args: &[OsString],
        mirror: Option<LineSink>,
    ) -> io::Result<PhaseOutput> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);

        let process = FfmpegProcess::spawn(&mut cmd, mirror)?;
        let (status, stderr) = process.wait_with_output()?;

        log_external_tool(
            &format!("ffmpeg ({stage})"),
            args,
            &stderr,
            status.code(),
            start.elapsed(),
        );

        Ok(PhaseOutput {
            success: status.success(),
            exit_code: status.code(),
            stderr,
        })
    }
}

// ═══════════════════════════════════════════════════════════════
// Transient artifacts
// ═══════════════════════════════════════════════════════════════

/// A file that lives for exactly one request. Dropping it removes the file;
/// a failed removal is logged and otherwise ignored.
#[derive(Debug)]
pub struct ScopedArtifact {
    path: PathBuf,
}

impl ScopedArtifact {
    fn create_in(dir: &Path, prefix: &str, suffix: &str) -> io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| e.error)?;
        debug!(path = %path.display(), "Transient artifact reserved");
        Ok(Self { path })
    }

    /// Reserves a unique palette path inside `dir`.
    pub fn palette_in(dir: &Path) -> io::Result<Self> {
        Self::create_in(dir, ".gif-maker-palette-", ".png")
    }

    /// Writes an ffconcat list of `files` inside `dir`.
    pub fn concat_list_in(dir: &Path, files: &[PathBuf]) -> io::Result<Self> {
        let artifact = Self::create_in(dir, ".gif-maker-frames-", ".txt")?;
        let file = fs::File::create(&artifact.path)?;
        write_concat_list(files, BufWriter::new(file))?;
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedArtifact {
    fn drop(&mut self) {
        match remove_artifact(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Transient artifact removed"),
            Err(e) => debug!(error = %e, "Ignoring cleanup failure"),
        }
    }
}

/// Removes `path`; a file that is already gone counts as removed.
pub fn remove_artifact(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(GifError::CleanupFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ═══════════════════════════════════════════════════════════════
// Command construction
// ═══════════════════════════════════════════════════════════════

fn push(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(OsString::from));
}

/// Frame-rate and input-selection arguments shared by both phases.
pub fn input_args(request: &ConversionRequest, concat_list: Option<&Path>) -> Vec<OsString> {
    let mut args = Vec::new();
    match (&request.input.selection, concat_list) {
        (InputSelection::Glob { pattern }, _) => {
            push(&mut args, &["-framerate", &request.frame_rate]);
            push(&mut args, &["-pattern_type", "glob", "-i", pattern]);
        }
        (InputSelection::ConcatList, list) => {
            push(&mut args, &["-f", "concat", "-safe", "0"]);
            push(&mut args, &["-r", &request.frame_rate, "-i"]);
            args.push(
                list.map(|p| p.as_os_str().to_os_string())
                    .unwrap_or_else(|| OsString::from("<frames>.txt")),
            );
        }
    }
    args
}

pub fn palette_args(request: &ConversionRequest, input: &[OsString], palette: &Path) -> Vec<OsString> {
    let mut args = vec![OsString::from("-y")];
    args.extend_from_slice(input);
    push(
        &mut args,
        &[
            "-vf",
            &format!("scale={},palettegen=stats_mode=diff", request.scale.filter_expr()),
        ],
    );
    args.push(palette.as_os_str().to_os_string());
    args
}

pub fn render_args(
    request: &ConversionRequest,
    input: &[OsString],
    palette: &Path,
    output: &Path,
) -> Vec<OsString> {
    let mut args = vec![OsString::from("-y")];
    args.extend_from_slice(input);
    args.push(OsString::from("-i"));
    args.push(palette.as_os_str().to_os_string());
    push(
        &mut args,
        &[
            "-lavfi",
            &format!(
                "scale={}[s];[s][1:v]paletteuse=dither={}",
                request.scale.filter_expr(),
                request.dither.as_ffmpeg()
            ),
            "-loop",
            "0",
        ],
    );
    args.push(output.as_os_str().to_os_string());
    args
}

/// Both argument lists, for display without running anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderPlan {
    pub palette: Vec<OsString>,
    pub render: Vec<OsString>,
}

pub fn plan(request: &ConversionRequest, output: &Path) -> EncoderPlan {
    let palette = request.work_dir.join("<palette>.png");
    let concat = request.work_dir.join("<frames>.txt");
    let concat = matches!(request.input.selection, InputSelection::ConcatList).then_some(concat.as_path());
    let input = input_args(request, concat);
    EncoderPlan {
        palette: palette_args(request, &input, &palette),
        render: render_args(request, &input, &palette, output),
    }
}

/// Shell-like rendering of an argument list, for logs and dry runs.
pub fn display_command(program: &OsStr, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(|a| {
            let s = a.to_string_lossy();
            if s.is_empty() || s.contains([' ', '\'', '"', ';', '[', '*']) {
                format!("'{}'", s.replace('\'', r"'\''"))
            } else {
                s.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ═══════════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════════

pub struct Orchestrator {
    runner: Arc<dyn EncoderRunner>,
    dates: Arc<dyn CaptureDateReader>,
    state: Cell<ConversionState>,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn EncoderRunner>) -> Self {
        Self {
            runner,
            dates: Arc::new(NoMetadata),
            state: Cell::new(ConversionState::Idle),
        }
    }

    /// Reader used to name the output when the user left it empty.
    pub fn with_dates(mut self, dates: Arc<dyn CaptureDateReader>) -> Self {
        self.dates = dates;
        self
    }

    pub fn state(&self) -> ConversionState {
        self.state.get()
    }

    fn transition(&self, next: ConversionState, events: &Sender<WorkerEvent>) {
        debug!(from = ?self.state.get(), to = ?next, "Conversion state change");
        self.state.set(next);
        let _ = events.send(WorkerEvent::State(next));
    }

    /// Runs both phases and returns the outcome. A panic inside a phase is
    /// turned into a failure of that phase; transient files are removed
    /// before this returns in every case.
    pub fn run(&self, request: &ConversionRequest, events: &Sender<WorkerEvent>) -> ConversionOutcome {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_phases(request, events)));

        let outcome = match result {
            Ok(Ok(output)) => ConversionOutcome::Succeeded { output },
            Ok(Err(err)) => ConversionOutcome::from_error(err, self.state.get().stage()),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(state = ?self.state.get(), message = %message, "Conversion worker panicked");
                ConversionOutcome::Failed {
                    stage: self.state.get().stage(),
                    diagnostic: format!("internal error: {}", message),
                }
            }
        };

        let success = outcome.is_success();
        self.transition(ConversionState::Done { success }, events);
        info!(
            success,
            duration_secs = started.elapsed().as_secs_f64(),
            "Conversion finished"
        );
        self.transition(ConversionState::Idle, events);
        outcome
    }

    fn run_phases(&self, request: &ConversionRequest, events: &Sender<WorkerEvent>) -> Result<PathBuf> {
        let _ = events.send(WorkerEvent::Progress(0));

        let output = request.output_path(self.dates.as_ref());
        debug!(output = %output.display(), "Output path resolved");

        let palette = ScopedArtifact::palette_in(&request.work_dir)?;
        let concat = match request.input.selection {
            InputSelection::ConcatList => Some(ScopedArtifact::concat_list_in(
                &request.work_dir,
                &request.input.files,
            )?),
            InputSelection::Glob { .. } => None,
        };
        let input = input_args(request, concat.as_ref().map(ScopedArtifact::path));

        self.transition(ConversionState::PaletteGenerating, events);
        self.run_phase(
            Stage::Palette,
            palette_args(request, &input, palette.path()),
            request,
            events,
        )?;

        self.transition(ConversionState::Rendering, events);
        let _ = events.send(WorkerEvent::Progress(50));
        self.run_phase(
            Stage::Render,
            render_args(request, &input, palette.path(), &output),
            request,
            events,
        )?;

        let _ = events.send(WorkerEvent::Progress(100));
        Ok(output)
    }

    fn run_phase(
        &self,
        stage: Stage,
        args: Vec<OsString>,
        request: &ConversionRequest,
        events: &Sender<WorkerEvent>,
    ) -> Result<()> {
        let mirror: Option<LineSink> = request.mirror_diagnostics.then(|| {
            let tx = events.clone();
            Box::new(move |line: &str| {
                let _ = tx.send(WorkerEvent::Log {
                    stage,
                    line: line.to_string(),
                });
            }) as LineSink
        });

        info!(%stage, "Starting encoder phase");
        let output = self.runner.run(stage, &args, mirror).map_err(|e| {
            warn!(%stage, error = %e, "Encoder could not be started");
            GifError::EncodePhaseFailed {
                stage,
                exit_code: None,
                diagnostic: format!("Failed to launch encoder: {}", e),
            }
        })?;

        if output.success {
            Ok(())
        } else {
            Err(GifError::EncodePhaseFailed {
                stage,
                exit_code: output.exit_code,
                diagnostic: output.stderr,
            })
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
