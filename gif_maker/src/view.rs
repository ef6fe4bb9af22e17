//! Terminal rendering of the application state.

use console::style;
use gif_core::{AppState, ConversionOutcome, WorkerEvent};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const TEMPLATE: &str =
    "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • ⏱️ {elapsed_precise} • {msg}";
const PROGRESS_CHARS: &str = "█▓░";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Where mirrored ffmpeg lines are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MirrorTarget {
    /// Above the progress bar.
    Bar,
    /// Straight to stderr; the bar is hidden so it would drop them.
    Stderr,
}

fn mirror_target(show_log: bool, quiet: bool) -> Option<MirrorTarget> {
    match (show_log, quiet) {
        (false, _) => None,
        (true, false) => Some(MirrorTarget::Bar),
        (true, true) => Some(MirrorTarget::Stderr),
    }
}

pub struct TerminalView {
    bar: ProgressBar,
    mirror: Option<MirrorTarget>,
}

impl TerminalView {
    pub fn new(show_log: bool, quiet: bool) -> Self {
        let bar = ProgressBar::new(100);
        if quiet {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        } else {
            // Falls back to the default style if the template is ever rejected.
            if let Ok(s) = ProgressStyle::default_bar().template(TEMPLATE) {
                bar.set_style(s.progress_chars(PROGRESS_CHARS).tick_chars(SPINNER_CHARS));
            }
            bar.set_prefix("GIF");
            bar.enable_steady_tick(Duration::from_millis(100));
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        }
        Self {
            bar,
            mirror: mirror_target(show_log, quiet),
        }
    }

    pub fn render(&self, state: &AppState, event: &WorkerEvent) {
        match event {
            WorkerEvent::Log { stage, line } => match self.mirror {
                Some(MirrorTarget::Bar) => self
                    .bar
                    .println(format!("{} {}", style(format!("[{stage}]")).dim(), line)),
                Some(MirrorTarget::Stderr) => eprintln!("[{stage}] {line}"),
                None => {}
            },
            WorkerEvent::Finished(_) => {
                self.bar.finish_and_clear();
                return;
            }
            _ => {}
        }
        self.bar.set_position(u64::from(state.progress));
        self.bar.set_message(state.status.clone());
    }
}

pub fn print_outcome(outcome: &ConversionOutcome) {
    match outcome {
        ConversionOutcome::Succeeded { .. } => {
            eprintln!("{}", style(outcome.user_message()).green().bold())
        }
        ConversionOutcome::Failed { .. } => eprintln!("{}", style(outcome.user_message()).red()),
    }
}

pub fn print_error(message: &str) {
    eprintln!("{}", style(message).red().bold());
}
