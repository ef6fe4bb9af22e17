//! Shared library for the gif_maker tool
//!
//! Converts a sequence of still images into an animated GIF by driving
//! ffmpeg twice: `palettegen` into a transient palette, then `paletteuse`
//! to render the animation.
//!
//! - Input resolution (folder glob or explicit file list)
//! - Scale resolution for the ffmpeg filter graph
//! - Request validation (tool check, fields, file discovery)
//! - Two-phase orchestration with guaranteed palette cleanup
//! - Front-end state + dispatch, worker events over mpsc
//! - Logging setup (tracing + rolling file)

pub mod app;
pub mod errors;
pub mod ffmpeg_process;
pub mod input;
pub mod logging;
pub mod metadata;
pub mod orchestrator;
pub mod request;
pub mod scale;
pub mod tools;
pub mod validate;

pub use app::{App, AppState, Dispatch, SubmitError, UiEvent};
pub use errors::{GifError, Result};
pub use input::{resolve, suggest_output_name, InputSelection, ResolvedInput};
pub use metadata::{CaptureDateReader, ExifToolReader, NoMetadata};
pub use orchestrator::{
    plan, ConversionOutcome, ConversionState, EncoderPlan, EncoderRunner, FfmpegRunner,
    Orchestrator, Stage, WorkerEvent,
};
pub use request::{
    ConversionDefaults, ConversionRequest, DitherMode, OutputTarget, RawRequest, ScaleInput, Source,
};
pub use scale::ScaleSpec;
pub use tools::{ToolLocator, WhichLocator, FFMPEG};
pub use validate::validate;
