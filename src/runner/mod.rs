//! Stage runners: drive a [`Converter`] over a stage's work items.
//!
//! Two scheduling regimes exist because the tools behind the stages differ:
//!
//! 1. [`resilient`]: one file at a time, with retry, tool restart and a
//!    circuit breaker. Used for PDF → Word, whose backing application is a
//!    single stateful GUI process that breaks under concurrent use.
//! 2. [`fanout`]: a bounded pool of independent tasks. Used for
//!    Word → Markdown and cleanup, whose converters share no state.
//!
//! Both runners use the destination-exists check as the resume ledger and
//! write a failure manifest into the stage output folder when files fail.
//!
//! [`Converter`]: crate::pipeline::converter::Converter

pub mod fanout;
pub mod resilient;

use crate::config::FAILURE_MANIFEST;
use crate::error::PipelineError;
use crate::pipeline::cleanup::write_atomic;
use host_hooks::FileTagger;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use fanout::FanOutRunner;
pub use resilient::{ResilientRunner, RetryPolicy};

/// Write the names of failed files, one per line, into `out_dir`.
pub fn write_failure_manifest(out_dir: &Path, failed: &[String]) -> Result<PathBuf, PipelineError> {
    let path = out_dir.join(FAILURE_MANIFEST);
    std::fs::create_dir_all(out_dir).map_err(|e| PipelineError::OutputWriteFailed {
        path: out_dir.to_path_buf(),
        source: e,
    })?;
    let mut body = failed.join("\n");
    body.push('\n');
    write_atomic(&path, body.as_bytes()).map_err(|e| PipelineError::OutputWriteFailed {
        path: path.clone(),
        source: e,
    })?;
    Ok(path)
}

/// Manifest write that never fails the stage. With no failures, a manifest
/// left by an earlier run is removed so the folder reflects this run.
pub(crate) fn record_failures(out_dir: &Path, failed: &[String]) -> Option<PathBuf> {
    if failed.is_empty() {
        clear_failure_manifest(out_dir);
        return None;
    }
    match write_failure_manifest(out_dir, failed) {
        Ok(path) => {
            warn!("{} failed file(s) listed in {}", failed.len(), path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Could not write failure manifest: {}", e);
            None
        }
    }
}

fn clear_failure_manifest(out_dir: &Path) {
    let path = out_dir.join(FAILURE_MANIFEST);
    match std::fs::remove_file(&path) {
        Ok(()) => debug!("Removed stale {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove stale {}: {}", path.display(), e),
    }
}

/// Upper bound on one tagging call. A stalled tagger must not hold up a stage.
pub(crate) const TAG_TIMEOUT: Duration = Duration::from_secs(15);

/// Tag a finished output. Any failure or timeout is logged and dropped.
pub(crate) async fn tag_output(tagger: &Arc<dyn FileTagger>, path: &Path) {
    match tokio::time::timeout(TAG_TIMEOUT, tagger.tag(path)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Tagging skipped: {}", e),
        Err(_) => warn!(
            "Tagging {} gave no answer within {}s",
            path.display(),
            TAG_TIMEOUT.as_secs()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn manifest_is_newline_joined() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("_stage1_docx");
        let path =
            write_failure_manifest(&out, &["a.pdf".to_string(), "b c.pdf".to_string()]).unwrap();
        assert_eq!(path, out.join(FAILURE_MANIFEST));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a.pdf\nb c.pdf\n");
    }

    #[test]
    fn no_manifest_without_failures() {
        let dir = TempDir::new().unwrap();
        assert!(record_failures(dir.path(), &[]).is_none());
        assert!(!dir.path().join(FAILURE_MANIFEST).exists());
    }

    #[test]
    fn clean_run_removes_previous_manifest() {
        let dir = TempDir::new().unwrap();
        write_failure_manifest(dir.path(), &["old.pdf".to_string()]).unwrap();
        assert!(dir.path().join(FAILURE_MANIFEST).exists());

        assert!(record_failures(dir.path(), &[]).is_none());
        assert!(!dir.path().join(FAILURE_MANIFEST).exists());
    }

    struct StalledTagger;

    #[async_trait::async_trait]
    impl FileTagger for StalledTagger {
        async fn tag(&self, _path: &Path) -> Result<(), host_hooks::HostError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_tagger_is_abandoned_after_timeout() {
        let tagger: Arc<dyn FileTagger> = Arc::new(StalledTagger);
        let started = tokio::time::Instant::now();
        tag_output(&tagger, Path::new("/out/a.md")).await;
        assert_eq!(started.elapsed(), TAG_TIMEOUT);
    }
}
