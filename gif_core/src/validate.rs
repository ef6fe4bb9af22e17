//! Request Validator
//!
//! `validate` turns a [`RawRequest`] into a [`ConversionRequest`] or the
//! first error found. Checks run in a fixed order and stop at the first
//! failure:
//!
//! 1. encoder on PATH (`MissingTool`)
//! 2. form fields (`InvalidInput`)
//! 3. file discovery (`NoFilesFound`)
//!
//! Nothing here spawns a process. An empty output name is left as
//! [`OutputTarget::Suggested`] so the capture-date lookup runs on the worker.

use crate::errors::{GifError, Result};
use crate::input::{self, extension_of, normalize_extension};
use crate::request::{
    with_gif_extension, ConversionRequest, OutputTarget, RawRequest, ScaleInput, Source,
};
use crate::scale::ScaleSpec;
use crate::tools::{require_tool, ToolLocator};
use std::path::Path;

/// Fields after parsing, before file discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFields {
    pub source: Source,
    pub extension: String,
    pub frame_rate: String,
    pub scale: ScaleSpec,
}

pub fn parse_frame_rate(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GifError::invalid("frame rate", "Please enter a frame rate"));
    }
    match text.parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate > 0.0 => Ok(text.to_string()),
        Ok(_) => Err(GifError::invalid(
            "frame rate",
            "Frame rate must be a positive number",
        )),
        Err(_) => Err(GifError::invalid(
            "frame rate",
            "Frame rate must be a valid number",
        )),
    }
}

fn parse_dimension(field: &'static str, text: &str) -> Result<u32> {
    match text.trim().parse::<i64>() {
        Ok(v) if v > 0 => u32::try_from(v)
            .map_err(|_| GifError::invalid(field, format!("{} is too large", capitalize(field)))),
        Ok(_) => Err(GifError::invalid(
            field,
            format!("{} must be a positive integer", capitalize(field)),
        )),
        Err(_) => Err(GifError::invalid(
            field,
            format!("{} must be a whole number of pixels", capitalize(field)),
        )),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn parse_scale(scale: &ScaleInput) -> Result<ScaleSpec> {
    match scale {
        ScaleInput::Factor(text) => match text.trim().parse::<f64>() {
            Ok(f) if f.is_finite() && f > 0.0 => Ok(ScaleSpec::factor(f)),
            Ok(_) => Err(GifError::invalid(
                "scale factor",
                "Scale factor must be a positive number",
            )),
            Err(_) => Err(GifError::invalid(
                "scale factor",
                "Scale factor must be a valid number",
            )),
        },
        ScaleInput::Pixels { width, height } => {
            let width = parse_dimension("width", width)?;
            let height = parse_dimension("height", height)?;
            Ok(ScaleSpec::pixels(width, height))
        }
    }
}

/// The encoder gets paths as text (glob pattern, concat list), so a name
/// that is not UTF-8 cannot be passed through faithfully.
fn require_utf8_paths(source: &Source) -> Result<()> {
    let non_utf8 = match source {
        Source::Folder(folder) => Some(folder).filter(|p| p.to_str().is_none()),
        Source::Files(files) => files.iter().find(|p| p.to_str().is_none()),
    };
    match non_utf8 {
        Some(path) => Err(GifError::invalid(
            "source",
            format!("Path is not valid UTF-8: {}", path.display()),
        )),
        None => Ok(()),
    }
}

/// Field checks only; no filesystem access beyond inspecting the selection.
pub fn parse_fields(raw: &RawRequest) -> Result<ParsedFields> {
    let source = raw
        .source
        .clone()
        .ok_or_else(|| GifError::invalid("source", "Please select a folder or files"))?;
    require_utf8_paths(&source)?;

    let inferred = match &source {
        Source::Files(files) => files.first().and_then(|f| extension_of(f)),
        Source::Folder(_) => None,
    };
    let extension = match normalize_extension(&raw.extension) {
        "" => inferred
            .ok_or_else(|| GifError::invalid("extension", "Please enter a file extension"))?,
        ext => ext.to_string(),
    };

    let frame_rate = parse_frame_rate(&raw.frame_rate)?;
    let scale = parse_scale(&raw.scale)?;

    Ok(ParsedFields {
        source,
        extension,
        frame_rate,
        scale,
    })
}

/// Where relative output names land: the frames' folder.
fn output_target(location: &Path, output_name: &str) -> OutputTarget {
    match output_name.trim() {
        "" => OutputTarget::Suggested {
            dir: location.to_path_buf(),
        },
        name => OutputTarget::Path(location.join(with_gif_extension(name))),
    }
}

pub fn validate(
    raw: &RawRequest,
    encoder: &str,
    locator: &dyn ToolLocator,
) -> Result<ConversionRequest> {
    require_tool(locator, encoder)?;

    let fields = parse_fields(raw)?;
    let resolved = input::resolve(&fields.source, &fields.extension)?;

    let output = output_target(&resolved.location, &raw.output_name);
    let work_dir = match &output {
        OutputTarget::Path(path) => path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| resolved.location.clone()),
        OutputTarget::Suggested { dir } => dir.clone(),
    };

    tracing::info!(
        frames = resolved.files.len(),
        frame_rate = %fields.frame_rate,
        scale = %fields.scale,
        output = ?output,
        "Request validated"
    );

    Ok(ConversionRequest {
        input: resolved,
        frame_rate: fields.frame_rate,
        scale: fields.scale,
        output,
        work_dir,
        dither: raw.dither,
        mirror_diagnostics: raw.mirror_diagnostics,
    })
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every non-positive frame rate is rejected.
        #[test]
        fn prop_non_positive_frame_rate_rejected(rate in -1.0e6f64..=0.0) {
            prop_assert!(parse_frame_rate(&rate.to_string()).is_err());
        }

        /// Every positive frame rate is accepted verbatim.
        #[test]
        fn prop_positive_frame_rate_accepted(rate in 0.001f64..1000.0) {
            let text = rate.to_string();
            prop_assert_eq!(parse_frame_rate(&text).unwrap(), text);
        }

        /// Non-positive factors are rejected.
        #[test]
        fn prop_non_positive_factor_rejected(f in -1.0e3f64..=0.0) {
            prop_assert!(parse_scale(&ScaleInput::Factor(f.to_string())).is_err());
        }

        /// A pixel pair is accepted only when both sides are positive.
        #[test]
        fn prop_pixel_dimensions(w in -100i64..100, h in -100i64..100) {
            let result = parse_scale(&ScaleInput::Pixels {
                width: w.to_string(),
                height: h.to_string(),
            });
            prop_assert_eq!(result.is_ok(), w > 0 && h > 0);
        }
    }
}
