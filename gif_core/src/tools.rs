//! External tool discovery
//!
//! The encoder is looked up on the execution search path once per request,
//! before any field is validated.

use crate::errors::{GifError, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const FFMPEG: &str = "ffmpeg";
pub const EXIFTOOL: &str = "exiftool";

/// Resolves a tool name (or explicit path) to an executable.
pub trait ToolLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf>;
}

/// Search-path lookup backed by `which`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhichLocator;

impl ToolLocator for WhichLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }
}

pub fn require_tool(locator: &dyn ToolLocator, tool: &str) -> Result<PathBuf> {
    match locator.locate(tool) {
        Some(path) => {
            tracing::debug!(tool, path = %path.display(), "External tool located");
            Ok(path)
        }
        None => {
            tracing::error!(tool, "External tool not found on PATH");
            Err(GifError::MissingTool {
                tool: tool_display_name(tool),
            })
        }
    }
}

fn tool_display_name(tool: &str) -> String {
    Path::new(tool)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| tool.to_string())
}

static EXIFTOOL_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Cached exiftool availability (checked once per process)
pub fn is_exiftool_available() -> bool {
    *EXIFTOOL_AVAILABLE.get_or_init(|| which::which(EXIFTOOL).is_ok())
}
