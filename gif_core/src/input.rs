//! Input Resolver
//!
//! Turns a folder or an explicit file list plus an extension into the
//! ordered frames handed to the encoder.
//!
//! Extension matching checks the upper-case variant first and the
//! lower-case variant second; the first non-empty set is used. When both
//! exist the upper-case set always wins, which keeps resolution
//! reproducible for folders that mix `IMG_1.JPG` and `img_2.jpg`.

use crate::errors::{GifError, Result};
use crate::metadata::{best_date, CaptureDateReader};
use crate::request::{with_gif_extension, Source};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How the encoder reads the frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSelection {
    /// `-pattern_type glob -i <pattern>`
    Glob { pattern: String },
    /// `-f concat -safe 0 -i <list>`; the list is written per request.
    ConcatList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    /// Frames in encoding order.
    pub files: Vec<PathBuf>,
    /// The case variant that matched.
    pub extension: String,
    /// Folder the frames live in.
    pub location: PathBuf,
    pub selection: InputSelection,
}

/// `".jpg"` and `"jpg"` are the same extension.
pub fn normalize_extension(ext: &str) -> &str {
    ext.trim().trim_start_matches('.')
}

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_string())
}

fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn has_exact_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

/// Upper-case variant first, lower-case second.
fn case_variants(ext: &str) -> [String; 2] {
    [ext.to_uppercase(), ext.to_lowercase()]
}

pub fn resolve(source: &Source, extension: &str) -> Result<ResolvedInput> {
    match source {
        Source::Folder(folder) => resolve_folder(folder, extension),
        Source::Files(files) => resolve_files(files, extension),
    }
}

fn resolve_folder(folder: &Path, extension: &str) -> Result<ResolvedInput> {
    let extension = normalize_extension(extension);

    let mut candidates: Vec<PathBuf> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| !is_hidden_file(p))
        .collect();
    // glob(3) order
    candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    for variant in case_variants(extension) {
        let files: Vec<PathBuf> = candidates
            .iter()
            .filter(|p| has_exact_extension(p, &variant))
            .cloned()
            .collect();

        if !files.is_empty() {
            let folder_text = folder.to_str().ok_or_else(|| {
                GifError::invalid(
                    "source",
                    format!("Path is not valid UTF-8: {}", folder.display()),
                )
            })?;
            let pattern = format!("{}/*.{}", escape_glob(folder_text), escape_glob(&variant));
            tracing::info!(
                folder = %folder.display(),
                extension = %variant,
                count = files.len(),
                "Resolved input frames"
            );
            return Ok(ResolvedInput {
                files,
                extension: variant,
                location: folder.to_path_buf(),
                selection: InputSelection::Glob { pattern },
            });
        }
    }

    Err(GifError::NoFilesFound {
        extension: extension.to_string(),
        location: folder.to_path_buf(),
    })
}

fn resolve_files(files: &[PathBuf], extension: &str) -> Result<ResolvedInput> {
    let location = files
        .first()
        .and_then(|f| f.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let extension = normalize_extension(extension);

    let existing: Vec<&PathBuf> = files
        .iter()
        .filter(|f| {
            let ok = f.is_file();
            if !ok {
                tracing::warn!(path = %f.display(), "Selected file does not exist, skipping");
            }
            ok
        })
        .collect();

    for variant in case_variants(extension) {
        let matched: Vec<PathBuf> = existing
            .iter()
            .filter(|p| has_exact_extension(p, &variant))
            .map(|p| (*p).clone())
            .collect();

        if !matched.is_empty() {
            tracing::info!(
                extension = %variant,
                count = matched.len(),
                "Resolved selected frames"
            );
            return Ok(ResolvedInput {
                files: matched,
                extension: variant,
                location,
                selection: InputSelection::ConcatList,
            });
        }
    }

    Err(GifError::NoFilesFound {
        extension: extension.to_string(),
        location,
    })
}

/// Escapes glob metacharacters so a literal folder name is not expanded.
/// ffmpeg globs with `GLOB_BRACE`, so braces count too.
pub fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Writes an ffconcat script listing `files` in order. Paths that are not
/// UTF-8 are refused rather than written lossily.
pub fn write_concat_list(files: &[PathBuf], mut writer: impl Write) -> std::io::Result<()> {
    writeln!(writer, "ffconcat version 1.0")?;
    for file in files {
        let absolute = fs::canonicalize(file).unwrap_or_else(|_| file.clone());
        let text = absolute.to_str().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame path is not valid UTF-8: {}", absolute.display()),
            )
        })?;
        let escaped = text.replace('\'', r"'\''");
        writeln!(writer, "file '{}'", escaped)?;
    }
    writer.flush()
}

/// Advisory output name: `<first stem>_<YYYYMMDD>.gif`.
pub fn suggest_output_name(first: &Path, reader: &dyn CaptureDateReader) -> String {
    let stem = first
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    let (date, source) = best_date(reader, first);
    tracing::debug!(path = %first.display(), ?source, "Date for suggested name");
    with_gif_extension(&format!("{}_{}", stem, date.format("%Y%m%d")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::NoMetadata;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"frame").unwrap();
        path
    }

    /// True when the filesystem distinguishes `a.JPG` from `a.jpg`.
    fn case_sensitive_fs(dir: &Path) -> bool {
        let probe = touch(dir, "probe.case");
        let sensitive = !dir.join("PROBE.CASE").exists();
        fs::remove_file(probe).unwrap();
        sensitive
    }

    #[test]
    fn test_upper_case_only() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.JPG");
        touch(dir.path(), "a.JPG");
        touch(dir.path(), "notes.txt");

        let resolved = resolve(&Source::Folder(dir.path().to_path_buf()), "jpg").unwrap();
        let names: Vec<_> = resolved
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.JPG"]);
        assert_eq!(resolved.extension, "JPG");
        match resolved.selection {
            InputSelection::Glob { pattern } => assert!(pattern.ends_with("/*.JPG")),
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    #[test]
    fn test_upper_case_preferred_over_lower() {
        let dir = TempDir::new().unwrap();
        if !case_sensitive_fs(dir.path()) {
            return;
        }
        touch(dir.path(), "a.JPG");
        touch(dir.path(), "b.jpg");
        touch(dir.path(), "c.jpg");

        for typed in ["jpg", "JPG", "Jpg"] {
            let resolved = resolve(&Source::Folder(dir.path().to_path_buf()), typed).unwrap();
            assert_eq!(resolved.extension, "JPG");
            assert_eq!(resolved.files.len(), 1);
        }
    }

    #[test]
    fn test_lower_case_fallback() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "f2.png");
        touch(dir.path(), "f1.png");

        let resolved = resolve(&Source::Folder(dir.path().to_path_buf()), ".PNG").unwrap();
        assert_eq!(resolved.extension, "png");
        assert_eq!(resolved.files[0].file_name().unwrap(), "f1.png");
    }

    #[test]
    fn test_no_files_found() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.png");
        touch(dir.path(), ".hidden.jpg");

        let err = resolve(&Source::Folder(dir.path().to_path_buf()), "jpg").unwrap_err();
        match err {
            GifError::NoFilesFound { extension, .. } => assert_eq!(extension, "jpg"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_nested_folders_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        touch(&dir.path().join("sub"), "deep.png");

        assert!(resolve(&Source::Folder(dir.path().to_path_buf()), "png").is_err());
    }

    #[test]
    fn test_file_list_keeps_user_order() {
        let dir = TempDir::new().unwrap();
        let c = touch(dir.path(), "c.png");
        let a = touch(dir.path(), "a.png");
        let skip = touch(dir.path(), "b.gif");

        let resolved = resolve(&Source::Files(vec![c.clone(), skip, a.clone()]), "png").unwrap();
        assert_eq!(resolved.files, vec![c, a]);
        assert_eq!(resolved.location, dir.path());
        assert_eq!(resolved.selection, InputSelection::ConcatList);
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("/tmp/shots [1]"), r"/tmp/shots \[1\]");
        assert_eq!(escape_glob("/photos/trip {2023}"), r"/photos/trip \{2023\}");
        assert_eq!(escape_glob("a{1,2}*"), r"a\{1,2\}\*");
        assert_eq!(escape_glob("plain"), "plain");
    }

    #[test]
    fn test_brace_folder_pattern_is_literal() {
        let root = TempDir::new().unwrap();
        let folder = root.path().join("trip {2023}");
        fs::create_dir(&folder).unwrap();
        touch(&folder, "a.png");

        let resolved = resolve(&Source::Folder(folder.clone()), "png").unwrap();
        match resolved.selection {
            InputSelection::Glob { pattern } => {
                assert!(pattern.ends_with(r"trip \{2023\}/*.png"), "{pattern}")
            }
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_paths_are_refused() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = TempDir::new().unwrap();
        let folder = root.path().join(OsStr::from_bytes(b"shots\xff"));
        fs::create_dir(&folder).unwrap();
        let frame = touch(&folder, "a.png");

        let err = resolve(&Source::Folder(folder), "png").unwrap_err();
        assert!(matches!(err, GifError::InvalidInput { field: "source", .. }));

        let err = write_concat_list(&[frame], Vec::new()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_concat_list_quotes_paths() {
        let mut buf = Vec::new();
        write_concat_list(&[PathBuf::from("/nonexistent/it's.png")], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("ffconcat version 1.0\n"));
        assert!(text.contains(r"file '/nonexistent/it'\''s.png'"));
    }

    struct Fixed(NaiveDateTime);
    impl CaptureDateReader for Fixed {
        fn capture_date(&self, _path: &Path) -> Option<NaiveDateTime> {
            Some(self.0)
        }
    }

    #[test]
    fn test_suggest_output_name_uses_capture_date() {
        let date = NaiveDate::from_ymd_opt(2023, 11, 2)
            .and_then(|d| d.and_hms_opt(8, 30, 0))
            .unwrap();
        let name = suggest_output_name(Path::new("/photos/IMG_0042.JPG"), &Fixed(date));
        assert_eq!(name, "IMG_0042_20231102.gif");
    }

    #[test]
    fn test_suggest_output_name_without_metadata() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "frame.png");
        let name = suggest_output_name(&file, &NoMetadata);
        assert!(name.starts_with("frame_"));
        assert!(name.ends_with(".gif"));
        assert_eq!(name.len(), "frame_YYYYMMDD.gif".len());
    }
}
