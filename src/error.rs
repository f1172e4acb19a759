//! Error types for the pdf-sidecar library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] is **fatal** to the call that returned it: the
//!   configuration is invalid, the input root does not exist, a manifest
//!   could not be written. Returned as `Err(PipelineError)`.
//!
//! * [`ConvertError`] is **non-fatal**: a single file failed (tool exited
//!   non-zero, timed out, is not installed) but every other file is still
//!   processed. Runners fold it into an [`crate::outcome::Outcome::Failed`]
//!   so one bad document never stops a stage.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that stop a pipeline call outright.
///
/// Per-file failures use [`ConvertError`] and end up in
/// [`crate::outcome::StageResult`] rather than propagating here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The root input folder does not exist or is not a directory.
    #[error("Input folder not found: '{path}'\nCheck the path exists and is a directory.")]
    InputDirNotFound { path: PathBuf },

    /// A stage directory could not be listed.
    #[error("Failed to read directory '{path}': {source}")]
    ReadDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Rule configuration errors ─────────────────────────────────────────
    /// The rule file exists but could not be read.
    #[error("Failed to read rule config '{path}': {source}")]
    RuleConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rule file is not valid YAML for the expected shape.
    #[error("Rule config '{path}' is malformed: {detail}")]
    RuleConfigParse { path: PathBuf, detail: String },

    /// The default rule file could not be created.
    #[error("Failed to create default rule config '{path}': {detail}")]
    RuleConfigCreate { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create a stage output directory or write a manifest.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for a single file.
///
/// Cloneable so runners can keep the last error of a retry sequence while
/// also reporting every attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvertError {
    /// The tool ran and exited with a non-zero status.
    #[error("{tool} exited with status {code}: {stderr}")]
    ToolFailed {
        tool: String,
        code: String,
        stderr: String,
    },

    /// The tool did not finish within its timeout and was killed.
    #[error("{tool} timed out after {secs}s")]
    TimedOut { tool: String, secs: u64 },

    /// The tool binary could not be found.
    #[error("{tool} not found. {hint}")]
    ToolMissing { tool: String, hint: String },

    /// The tool reported success but the destination file is absent.
    #[error("conversion reported success but '{path}' was not written")]
    MissingOutput { path: PathBuf },

    /// Reading the input or writing the output failed.
    #[error("I/O error on '{path}': {detail}")]
    Io { path: PathBuf, detail: String },

    /// Unexpected condition caught at the adapter boundary.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The file or folder the error is about, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            PipelineError::InputDirNotFound { path }
            | PipelineError::ReadDirFailed { path, .. }
            | PipelineError::RuleConfigRead { path, .. }
            | PipelineError::RuleConfigParse { path, .. }
            | PipelineError::RuleConfigCreate { path, .. }
            | PipelineError::OutputWriteFailed { path, .. } => Some(path),
            PipelineError::InvalidConfig(_) => None,
        }
    }
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_missing_display_carries_hint() {
        let e = ConvertError::ToolMissing {
            tool: "pandoc".into(),
            hint: "Install with: brew install pandoc".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("pandoc not found"), "got: {msg}");
        assert!(msg.contains("brew install pandoc"), "got: {msg}");
    }

    #[test]
    fn timed_out_display() {
        let e = ConvertError::TimedOut {
            tool: "osascript".into(),
            secs: 180,
        };
        assert_eq!(e.to_string(), "osascript timed out after 180s");
    }

    #[test]
    fn tool_failed_display() {
        let e = ConvertError::ToolFailed {
            tool: "pandoc".into(),
            code: "64".into(),
            stderr: "Unknown input format".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("status 64"));
        assert!(msg.contains("Unknown input format"));
    }

    #[test]
    fn input_dir_not_found_display() {
        let e = PipelineError::InputDirNotFound {
            path: PathBuf::from("/no/such/dir"),
        };
        assert!(e.to_string().contains("/no/such/dir"));
    }

    #[test]
    fn path_is_exposed_for_folder_errors() {
        let e = PipelineError::OutputWriteFailed {
            path: PathBuf::from("/root/_stage1_docx"),
            source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
        };
        assert_eq!(e.path(), Some(Path::new("/root/_stage1_docx")));
        assert_eq!(PipelineError::InvalidConfig("x".into()).path(), None);
    }

    #[test]
    fn invalid_config_display() {
        let e = PipelineError::InvalidConfig("workers must be ≥ 1".into());
        assert!(e.to_string().starts_with("Invalid configuration"));
    }
}
