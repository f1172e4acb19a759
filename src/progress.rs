//! Progress-callback trait for per-file pipeline events.
//!
//! Inject an [`Arc<dyn StageProgress>`] through
//! [`crate::orchestrator::Pipeline::with_progress`] to receive events as each
//! stage walks its files. The library itself only logs through `tracing`;
//! everything a person watching the terminal should see arrives here.
//!
//! # Example
//!
//! ```rust
//! use pdf_sidecar::{Stage, StageProgress};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingProgress {
//!     converted: AtomicUsize,
//! }
//!
//! impl StageProgress for CountingProgress {
//!     fn on_item_complete(&self, stage: Stage, _index: usize, _total: usize, file: &str) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage}: {file} done");
//!     }
//! }
//! ```

use crate::config::Stage;
use crate::outcome::StageResult;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Why the stage-1 tool was restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// The periodic restart after N successful conversions.
    Periodic,
    /// Every retry for a file failed.
    RetriesExhausted,
}

/// Called by the runners as they process each file.
///
/// Implementations must be `Send + Sync`: the fan-out runner reports from
/// several tasks at once. All methods default to no-ops so callers only
/// override what they care about.
///
/// `index` is 1-based. On the parallel path it counts completions, not input
/// order.
pub trait StageProgress: Send + Sync {
    /// Called once per stage after the input directory has been scanned.
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// The stage is skipped: its input folder is missing, or a folder it
    /// needs could not be read or created. `hint` says which.
    fn on_stage_unavailable(&self, stage: Stage, missing: &Path, hint: &str) {
        let _ = (stage, missing, hint);
    }

    /// A conversion is about to be attempted (sequential paths only).
    fn on_item_start(&self, stage: Stage, index: usize, total: usize, file: &str) {
        let _ = (stage, index, total, file);
    }

    /// The destination already existed.
    fn on_item_skipped(&self, stage: Stage, index: usize, total: usize, file: &str) {
        let _ = (stage, index, total, file);
    }

    /// The file converted successfully.
    fn on_item_complete(&self, stage: Stage, index: usize, total: usize, file: &str) {
        let _ = (stage, index, total, file);
    }

    /// The file failed for good.
    fn on_item_error(&self, stage: Stage, index: usize, total: usize, file: &str, error: &str) {
        let _ = (stage, index, total, file, error);
    }

    /// An attempt failed and another follows after `delay`.
    fn on_retry(&self, stage: Stage, file: &str, retry: usize, delay: Duration, error: &str) {
        let _ = (stage, file, retry, delay, error);
    }

    /// The stage-1 tool is being restarted.
    fn on_restart(&self, stage: Stage, reason: RestartReason) {
        let _ = (stage, reason);
    }

    /// Advisory projection of the time left in the stage.
    fn on_eta(&self, stage: Stage, remaining: Duration) {
        let _ = (stage, remaining);
    }

    /// The circuit breaker tripped; the rest of the stage is abandoned.
    fn on_circuit_open(&self, stage: Stage, consecutive_failures: usize, manifest: Option<&Path>) {
        let _ = (stage, consecutive_failures, manifest);
    }

    /// Called once per stage after every file has been handled (or the stage aborted).
    fn on_stage_complete(&self, stage: Stage, result: &StageResult) {
        let _ = (stage, result);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl StageProgress for NoopProgress {}

/// Convenience alias for the shared callback handle.
pub type ProgressHandle = Arc<dyn StageProgress>;
