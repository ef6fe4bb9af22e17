//! GifError - error taxonomy for one conversion request
//!
//! Detection order is fixed: tool availability, then field validation,
//! then file discovery, then encoder invocation. `CleanupFailed` exists so
//! the palette guard can log a typed error; it never reaches the user.

use crate::orchestrator::Stage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GifError {
    #[error("External tool not found: {tool}")]
    MissingTool { tool: String },

    #[error("Invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("No .{extension} files found in {}", location.display())]
    NoFilesFound {
        extension: String,
        location: PathBuf,
    },

    #[error("FFmpeg {stage} phase failed (exit code {exit_code:?})")]
    EncodePhaseFailed {
        stage: Stage,
        exit_code: Option<i32>,
        diagnostic: String,
    },

    #[error("Failed to remove {}: {source}", path.display())]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GifError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        GifError::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// The single message shown to the user. Encoder diagnostics are passed
    /// through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            GifError::MissingTool { tool } => format!(
                "❌ {} not found.\n💡 Please install {} and ensure it's in your PATH.",
                tool, tool
            ),
            GifError::InvalidInput { message, .. } => format!("❌ {}", message),
            GifError::NoFilesFound {
                extension,
                location,
            } => format!(
                "❌ No .{} files found in {}",
                extension,
                location.display()
            ),
            GifError::EncodePhaseFailed {
                stage, diagnostic, ..
            } => {
                if diagnostic.trim().is_empty() {
                    format!("❌ FFmpeg failed during {} generation", stage)
                } else {
                    format!(
                        "❌ FFmpeg failed during {} generation:\n{}",
                        stage,
                        diagnostic.trim_end()
                    )
                }
            }
            GifError::CleanupFailed { path, source } => {
                format!("⚠️ Could not remove {}: {}", path.display(), source)
            }
            GifError::Io(e) => format!("❌ IO error: {}", e),
        }
    }
}

pub type Result<T> = std::result::Result<T, GifError>;
