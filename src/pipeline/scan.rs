//! Input discovery: list a stage's input folder as [`WorkItem`]s.

use crate::error::PipelineError;
use crate::outcome::WorkItem;
use crate::pipeline::converter::destination_for;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files in `dir` with `extension` (case-insensitive), sorted by name.
///
/// Hidden files are ignored; on macOS volumes these are usually AppleDouble
/// `._name.pdf` companions that no converter can read.
pub fn list_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::ReadDirFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            !path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true)
        })
        .filter(|path| {
            path.extension()
                .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    debug!("Found {} .{} file(s) in {}", files.len(), extension, dir.display());
    Ok(files)
}

/// Pair every input in `in_dir` with its destination in `out_dir`.
///
/// Inputs that differ only in extension case (`a.pdf`, `a.PDF`) share a
/// destination. The first in sorted order keeps it and the rest are skipped.
pub fn discover(
    in_dir: &Path,
    in_ext: &str,
    out_dir: &Path,
    out_ext: &str,
) -> Result<Vec<WorkItem>, PipelineError> {
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut items = Vec::new();
    for src in list_inputs(in_dir, in_ext)? {
        let dest = destination_for(&src, out_dir, out_ext);
        if let Some(first) = claimed.get(&dest) {
            warn!(
                "Skipping {}: {} already writes {}",
                src.display(),
                first.display(),
                dest.display()
            );
            continue;
        }
        claimed.insert(dest.clone(), src.clone());
        items.push(WorkItem::new(src, dest));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lists_matching_files_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["b.pdf", "a.PDF", "c.txt", "._a.pdf", ".hidden.pdf"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("folder.pdf")).unwrap();

        let files = list_inputs(dir.path(), "pdf").unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn discover_maps_destinations() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("paper.docx"), b"x").unwrap();
        let out = dir.path().join("md");

        let items = discover(dir.path(), "docx", &out, "md").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].destination(), out.join("paper.md"));
        assert!(!items[0].is_done());
    }

    // Needs a case-sensitive filesystem to hold both names.
    #[cfg(target_os = "linux")]
    #[test]
    fn colliding_destinations_keep_first_input() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("x.pdf"), b"lower").unwrap();
        std::fs::write(dir.path().join("x.PDF"), b"upper").unwrap();
        let out = dir.path().join("docx");

        let items = discover(dir.path(), "pdf", &out, "docx").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source(), dir.path().join("x.PDF"));
        assert_eq!(items[0].destination(), out.join("x.docx"));
    }

    #[test]
    fn missing_dir_is_an_error() {
        let err = list_inputs(Path::new("/definitely/not/here"), "pdf").unwrap_err();
        assert!(matches!(err, PipelineError::ReadDirFailed { .. }));
    }
}
