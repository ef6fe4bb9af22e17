//! Application state and event dispatch
//!
//! The front-end owns one [`App`]. All state lives in [`AppState`] and
//! changes only through [`App::dispatch`]. The background worker never
//! sees `AppState`; it reports through an mpsc channel whose events are
//! fed back into `dispatch` by the foreground loop.

use crate::errors::GifError;
use crate::metadata::CaptureDateReader;
use crate::orchestrator::{ConversionOutcome, ConversionState, EncoderRunner, Orchestrator, WorkerEvent};
use crate::request::RawRequest;
use crate::tools::ToolLocator;
use crate::validate::validate;
use std::sync::mpsc::{self, Receiver, RecvError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Front-end state, owned by the foreground thread.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub controls_enabled: bool,
    pub status: String,
    pub progress: u8,
    pub phase: ConversionState,
    /// Mirrored encoder stderr, when requested.
    pub log: Vec<String>,
    pub outcome: Option<ConversionOutcome>,
    /// Last synchronous error (validation, busy, spawn).
    pub error: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            controls_enabled: true,
            status: "Ready".to_string(),
            progress: 0,
            phase: ConversionState::Idle,
            log: Vec::new(),
            outcome: None,
            error: None,
        }
    }
}

impl AppState {
    pub fn is_busy(&self) -> bool {
        !self.controls_enabled
    }
}

#[derive(Debug)]
pub enum UiEvent {
    Submit(RawRequest),
    Worker(WorkerEvent),
}

/// Result of dispatching one event.
#[derive(Debug)]
pub enum Dispatch {
    /// A worker was started for the submitted request.
    Started,
    /// The submission was refused; nothing was spawned.
    Rejected(SubmitError),
    /// A worker event was applied to the state.
    Applied,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("A conversion is already running")]
    Busy,
    #[error(transparent)]
    Invalid(#[from] GifError),
    #[error("Failed to start worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SubmitError {
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Invalid(e) => e.user_message(),
            other => format!("❌ {}", other),
        }
    }
}

pub struct App {
    state: AppState,
    encoder: String,
    runner: Arc<dyn EncoderRunner>,
    locator: Box<dyn ToolLocator>,
    dates: Arc<dyn CaptureDateReader>,
    tx: Sender<WorkerEvent>,
    rx: Receiver<WorkerEvent>,
    worker: Option<JoinHandle<()>>,
}

impl App {
    pub fn new(
        encoder: impl Into<String>,
        runner: Arc<dyn EncoderRunner>,
        locator: Box<dyn ToolLocator>,
        dates: Arc<dyn CaptureDateReader>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            state: AppState::default(),
            encoder: encoder.into(),
            runner,
            locator,
            dates,
            tx,
            rx,
            worker: None,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn dispatch(&mut self, event: UiEvent) -> Dispatch {
        match event {
            UiEvent::Submit(raw) => match self.submit(raw) {
                Ok(()) => Dispatch::Started,
                Err(e) => {
                    if !matches!(e, SubmitError::Busy) {
                        self.state.error = Some(e.user_message());
                    }
                    Dispatch::Rejected(e)
                }
            },
            UiEvent::Worker(event) => {
                self.apply(event);
                Dispatch::Applied
            }
        }
    }

    /// Blocks until the worker reports something. Only meaningful while busy.
    pub fn next_worker_event(&self) -> Result<WorkerEvent, RecvError> {
        self.rx.recv()
    }

    fn submit(&mut self, raw: RawRequest) -> Result<(), SubmitError> {
        if self.state.is_busy() || self.worker.is_some() {
            warn!("Submit ignored: a conversion is already running");
            return Err(SubmitError::Busy);
        }

        let request = validate(&raw, &self.encoder, self.locator.as_ref())?;

        // Controls go down before the first process can start.
        self.state = AppState {
            controls_enabled: false,
            status: "Generating palette...".to_string(),
            ..AppState::default()
        };

        let runner = Arc::clone(&self.runner);
        let dates = Arc::clone(&self.dates);
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name("gif-worker".into())
            .spawn(move || {
                let outcome = Orchestrator::new(runner)
                    .with_dates(dates)
                    .run(&request, &tx);
                let _ = tx.send(WorkerEvent::Finished(outcome));
            });

        match spawned {
            Ok(handle) => {
                info!("Conversion worker started");
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.state.controls_enabled = true;
                self.state.status = "Ready".to_string();
                Err(SubmitError::Spawn(e))
            }
        }
    }

    fn apply(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::State(phase) => {
                self.state.phase = phase;
                match phase {
                    ConversionState::PaletteGenerating => {
                        self.state.status = "Generating palette...".to_string()
                    }
                    ConversionState::Rendering => self.state.status = "Rendering GIF...".to_string(),
                    ConversionState::Done { .. } | ConversionState::Idle => {}
                }
            }
            WorkerEvent::Progress(p) => self.state.progress = p.min(100),
            WorkerEvent::Log { line, .. } => self.state.log.push(line),
            WorkerEvent::Finished(outcome) => {
                if let Some(handle) = self.worker.take() {
                    if handle.join().is_err() {
                        warn!("Conversion worker exited abnormally");
                    }
                }
                self.state.status = match &outcome {
                    ConversionOutcome::Succeeded { .. } => "Done".to_string(),
                    ConversionOutcome::Failed { stage, .. } => format!("Failed ({stage})"),
                };
                self.state.phase = ConversionState::Idle;
                self.state.outcome = Some(outcome);
                self.state.controls_enabled = true;
            }
        }
    }

    /// Drives the worker to completion, calling `render` after each event.
    pub fn run_to_completion(&mut self, mut render: impl FnMut(&AppState, &WorkerEvent)) {
        while self.state.is_busy() {
            let Ok(event) = self.next_worker_event() else {
                break;
            };
            let snapshot = event.clone();
            self.dispatch(UiEvent::Worker(event));
            render(&self.state, &snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::NoMetadata;
    use crate::orchestrator::testing::{FakeRunner, Script};
    use crate::orchestrator::{PhaseOutput, Stage};
    use crate::ffmpeg_process::LineSink;
    use crate::request::Source;
    use std::ffi::OsString;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Found;
    impl ToolLocator for Found {
        fn locate(&self, tool: &str) -> Option<PathBuf> {
            Some(PathBuf::from(tool))
        }
    }

    fn app_with(runner: Arc<dyn EncoderRunner>) -> App {
        App::new("ffmpeg", runner, Box::new(Found), Arc::new(NoMetadata))
    }

    fn frames(dir: &Path) -> RawRequest {
        for i in 1..=4 {
            fs::write(dir.join(format!("f{i}.png")), b"frame").unwrap();
        }
        RawRequest {
            source: Some(Source::Folder(dir.to_path_buf())),
            extension: "png".into(),
            frame_rate: "4".into(),
            output_name: "movie".into(),
            ..RawRequest::default()
        }
    }

    #[test]
    fn test_full_success_path() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::ok());
        let mut app = app_with(runner.clone());

        assert!(matches!(
            app.dispatch(UiEvent::Submit(frames(dir.path()))),
            Dispatch::Started
        ));
        assert!(!app.state().controls_enabled);

        let mut progress = Vec::new();
        app.run_to_completion(|_, event| {
            if let WorkerEvent::Progress(p) = event {
                progress.push(*p);
            }
        });

        assert_eq!(progress, vec![0, 50, 100]);
        assert!(app.state().controls_enabled);
        assert_eq!(
            app.state().outcome,
            Some(ConversionOutcome::Succeeded {
                output: dir.path().join("movie.gif")
            })
        );
        assert_eq!(runner.calls().len(), 2);
    }

    /// Records which thread asked for a capture date.
    struct ThreadRecorder(Mutex<Vec<Option<String>>>);

    impl CaptureDateReader for ThreadRecorder {
        fn capture_date(&self, _path: &Path) -> Option<chrono::NaiveDateTime> {
            let name = thread::current().name().map(str::to_string);
            self.0.lock().unwrap().push(name);
            None
        }
    }

    #[test]
    fn test_suggested_name_looked_up_on_worker() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(ThreadRecorder(Mutex::new(Vec::new())));
        let mut app = App::new(
            "ffmpeg",
            Arc::new(FakeRunner::ok()),
            Box::new(Found),
            recorder.clone(),
        );

        let raw = RawRequest {
            output_name: String::new(),
            ..frames(dir.path())
        };
        assert!(matches!(app.dispatch(UiEvent::Submit(raw)), Dispatch::Started));
        app.run_to_completion(|_, _| {});

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![Some("gif-worker".to_string())]
        );
        match &app.state().outcome {
            Some(ConversionOutcome::Succeeded { output }) => {
                assert_eq!(output.parent().unwrap(), dir.path());
                let name = output.file_name().unwrap().to_string_lossy();
                assert!(name.starts_with("f1_") && name.ends_with(".gif"), "{name}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_input_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::ok());
        let mut app = app_with(runner.clone());

        let raw = RawRequest {
            frame_rate: "0".into(),
            ..frames(dir.path())
        };
        let result = app.dispatch(UiEvent::Submit(raw));

        assert!(matches!(
            result,
            Dispatch::Rejected(SubmitError::Invalid(GifError::InvalidInput { .. }))
        ));
        assert!(app.state().controls_enabled);
        assert!(app.state().error.is_some());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_palette_failure_re_enables_controls() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(
            Script::Exit(1, "bad palette\n"),
            Script::Exit(0, ""),
        ));
        let mut app = app_with(runner.clone());

        app.dispatch(UiEvent::Submit(frames(dir.path())));
        app.run_to_completion(|_, _| {});

        assert!(app.state().controls_enabled);
        assert_eq!(app.state().status, "Failed (palette)");
        assert_eq!(runner.calls().len(), 1);
        assert!(matches!(
            app.state().outcome,
            Some(ConversionOutcome::Failed {
                stage: Stage::Palette,
                ..
            })
        ));
    }

    /// Blocks the palette phase until released so a second submit can be
    /// attempted while the first is in flight.
    struct Gate {
        release: Mutex<Option<mpsc::Receiver<()>>>,
        calls: Mutex<usize>,
    }

    impl EncoderRunner for Gate {
        fn run(
            &self,
            stage: Stage,
            _args: &[OsString],
            _mirror: Option<LineSink>,
        ) -> std::io::Result<PhaseOutput> {
            *self.calls.lock().unwrap() += 1;
            if stage == Stage::Palette {
                if let Some(rx) = self.release.lock().unwrap().take() {
                    let _ = rx.recv();
                }
            }
            Ok(PhaseOutput {
                success: true,
                exit_code: Some(0),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_second_submit_while_busy_is_refused() {
        let dir = TempDir::new().unwrap();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Arc::new(Gate {
            release: Mutex::new(Some(release_rx)),
            calls: Mutex::new(0),
        });
        let mut app = app_with(gate.clone());

        let raw = frames(dir.path());
        assert!(matches!(app.dispatch(UiEvent::Submit(raw.clone())), Dispatch::Started));
        assert!(matches!(
            app.dispatch(UiEvent::Submit(raw)),
            Dispatch::Rejected(SubmitError::Busy)
        ));

        release_tx.send(()).unwrap();
        app.run_to_completion(|_, _| {});

        assert_eq!(*gate.calls.lock().unwrap(), 2);
        assert!(app.state().outcome.as_ref().unwrap().is_success());
    }

    #[test]
    fn test_mirrored_log_reaches_state() {
        let dir = TempDir::new().unwrap();
        let mut fake = FakeRunner::ok();
        fake.lines = vec!["Input #0, image2"];
        let mut app = app_with(Arc::new(fake));

        let raw = RawRequest {
            mirror_diagnostics: true,
            ..frames(dir.path())
        };
        app.dispatch(UiEvent::Submit(raw));
        app.run_to_completion(|_, _| {});

        assert_eq!(app.state().log, vec!["Input #0, image2", "Input #0, image2"]);
    }

    #[test]
    fn test_panicking_encoder_still_finishes() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::new(Script::Panic, Script::Exit(0, "")));
        let mut app = app_with(runner);

        app.dispatch(UiEvent::Submit(frames(dir.path())));
        app.run_to_completion(|_, _| {});

        assert!(app.state().controls_enabled);
        assert!(!app.state().outcome.as_ref().unwrap().is_success());
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".gif-maker-"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
