//! ExifTool wrapper for reading capture dates
//!
//! Only consulted when exiftool is on PATH; the availability check is
//! cached for the whole process.

use super::CaptureDateReader;
use crate::tools::{is_exiftool_available, EXIFTOOL};
use chrono::NaiveDateTime;
use std::path::Path;
use std::process::Command;

const DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Debug, Default, Clone, Copy)]
pub struct ExifToolReader;

impl CaptureDateReader for ExifToolReader {
    fn capture_date(&self, path: &Path) -> Option<NaiveDateTime> {
        if !is_exiftool_available() {
            return None;
        }

        let output = Command::new(EXIFTOOL)
            .arg("-s3") // values only
            .arg("-d")
            .arg(DATE_FORMAT)
            .arg("-EXIF:DateTimeOriginal")
            .arg("-EXIF:CreateDate")
            .arg("-XMP-xmp:CreateDate")
            .arg(path)
            .output()
            .map_err(|e| {
                tracing::debug!(path = %path.display(), error = %e, "exiftool did not run");
                e
            })
            .ok()?;

        parse_first_date(&String::from_utf8_lossy(&output.stdout))
    }
}

/// First non-empty, non-zero date line of `exiftool -s3` output.
fn parse_first_date(stdout: &str) -> Option<NaiveDateTime> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains("0000:00:00"))
        .find_map(|line| NaiveDateTime::parse_from_str(line, DATE_FORMAT).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_date_skips_zero_dates() {
        let out = "0000:00:00 00:00:00\n2021:03:14 15:09:26\n2020:01:01 00:00:00\n";
        let date = parse_first_date(out).unwrap();
        assert_eq!(date.format("%Y%m%d").to_string(), "20210314");
    }

    #[test]
    fn test_parse_first_date_empty() {
        assert!(parse_first_date("").is_none());
        assert!(parse_first_date("\n  \n").is_none());
    }
}
