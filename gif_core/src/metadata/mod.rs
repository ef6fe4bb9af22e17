//! Capture-date lookup for naming the output
//!
//! Priority: embedded capture timestamp (EXIF/XMP via exiftool) >
//! file modification time > current local time. Every step is optional and
//! a failure just falls through to the next one.

use chrono::{DateTime, Local, NaiveDateTime};
use std::path::Path;

mod exif;

pub use exif::ExifToolReader;

/// Where a capture date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    Embedded,
    FileModified,
    Now,
}

/// Reads an image's original capture timestamp. Shared with the worker
/// thread, which is where lookups happen during a conversion.
pub trait CaptureDateReader: Send + Sync {
    fn capture_date(&self, path: &Path) -> Option<NaiveDateTime>;
}

/// Reader that never finds embedded metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl CaptureDateReader for NoMetadata {
    fn capture_date(&self, _path: &Path) -> Option<NaiveDateTime> {
        None
    }
}

pub fn best_date(reader: &dyn CaptureDateReader, path: &Path) -> (NaiveDateTime, DateSource) {
    if let Some(date) = reader.capture_date(path) {
        return (date, DateSource::Embedded);
    }

    if let Some(mtime) = std::fs::metadata(path).and_then(|m| m.modified()).ok() {
        let datetime: DateTime<Local> = mtime.into();
        return (datetime.naive_local(), DateSource::FileModified);
    }

    tracing::debug!(path = %path.display(), "No usable date on file, using current time");
    (Local::now().naive_local(), DateSource::Now)
}
