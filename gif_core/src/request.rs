//! Request types: raw form input and the validated conversion request.

use crate::input::{suggest_output_name, ResolvedInput};
use crate::metadata::CaptureDateReader;
use crate::scale::ScaleSpec;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const GIF_EXTENSION: &str = "gif";

/// Defaults of the conversion form.
pub struct ConversionDefaults;

impl ConversionDefaults {
    pub const EXTENSION: &'static str = "JPG";
    pub const FRAME_RATE: &'static str = "4";
    pub const FACTOR: &'static str = "0.5";
    pub const OUTPUT_NAME: &'static str = "output.gif";
}

/// What the user picked as input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Folder(PathBuf),
    /// Explicit files; order is kept.
    Files(Vec<PathBuf>),
}

impl Source {
    /// Folder sources stay folders; a single selected directory is treated
    /// as a folder too.
    pub fn from_paths(paths: Vec<PathBuf>) -> Option<Self> {
        match paths.as_slice() {
            [] => None,
            [only] if only.is_dir() => Some(Source::Folder(only.clone())),
            _ => Some(Source::Files(paths)),
        }
    }
}

/// Text of the scale fields, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleInput {
    Factor(String),
    Pixels { width: String, height: String },
}

impl Default for ScaleInput {
    fn default() -> Self {
        ScaleInput::Factor(ConversionDefaults::FACTOR.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DitherMode {
    #[default]
    FloydSteinberg,
    Bayer,
    Sierra2_4a,
    None,
}

impl DitherMode {
    pub fn as_ffmpeg(&self) -> &'static str {
        match self {
            DitherMode::FloydSteinberg => "floyd_steinberg",
            DitherMode::Bayer => "bayer",
            DitherMode::Sierra2_4a => "sierra2_4a",
            DitherMode::None => "none",
        }
    }
}

impl fmt::Display for DitherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ffmpeg())
    }
}

impl FromStr for DitherMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "floyd_steinberg" | "floyd-steinberg" => Ok(DitherMode::FloydSteinberg),
            "bayer" => Ok(DitherMode::Bayer),
            "sierra2_4a" => Ok(DitherMode::Sierra2_4a),
            "none" => Ok(DitherMode::None),
            other => Err(format!("unknown dither mode: {}", other)),
        }
    }
}

/// Unvalidated form state, as typed by the user.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub source: Option<Source>,
    /// Empty means "infer from the first selected file".
    pub extension: String,
    pub frame_rate: String,
    pub scale: ScaleInput,
    /// Empty means "use the suggested name".
    pub output_name: String,
    pub dither: DitherMode,
    /// Mirror encoder stderr lines to the front-end as they arrive.
    pub mirror_diagnostics: bool,
}

impl Default for RawRequest {
    fn default() -> Self {
        Self {
            source: None,
            extension: ConversionDefaults::EXTENSION.to_string(),
            frame_rate: ConversionDefaults::FRAME_RATE.to_string(),
            scale: ScaleInput::default(),
            output_name: ConversionDefaults::OUTPUT_NAME.to_string(),
            dither: DitherMode::default(),
            mirror_diagnostics: false,
        }
    }
}

/// Where the GIF is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A name the user typed, already placed next to the frames.
    Path(PathBuf),
    /// Named after the first frame and its capture date. Resolving it may
    /// run exiftool, so it happens on the worker.
    Suggested { dir: PathBuf },
}

impl OutputTarget {
    pub fn resolve(&self, first_frame: Option<&Path>, dates: &dyn CaptureDateReader) -> PathBuf {
        match self {
            OutputTarget::Path(path) => path.clone(),
            OutputTarget::Suggested { dir } => dir.join(match first_frame {
                Some(first) => suggest_output_name(first, dates),
                None => ConversionDefaults::OUTPUT_NAME.to_string(),
            }),
        }
    }
}

/// A request that passed every check in `validate`.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: ResolvedInput,
    /// Kept as typed so `-framerate` receives the user's exact value.
    pub frame_rate: String,
    pub scale: ScaleSpec,
    pub output: OutputTarget,
    /// Directory that receives the transient palette and concat list.
    pub work_dir: PathBuf,
    pub dither: DitherMode,
    pub mirror_diagnostics: bool,
}

impl ConversionRequest {
    /// Final output path. May block on metadata lookups.
    pub fn output_path(&self, dates: &dyn CaptureDateReader) -> PathBuf {
        self.output
            .resolve(self.input.files.first().map(PathBuf::as_path), dates)
    }
}

/// Appends `.gif` unless the name already ends with it (any case).
pub fn with_gif_extension(name: &str) -> String {
    let suffix = format!(".{}", GIF_EXTENSION);
    if name.to_ascii_lowercase().ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}
