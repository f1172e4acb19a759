//! Per-file outcomes and per-stage summaries.

use crate::config::Stage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One (source, destination) pair a stage must process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    source: PathBuf,
    destination: PathBuf,
}

impl WorkItem {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// File name of the source, used in progress lines and the failure manifest.
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    /// Whether this item's output already exists (the resume ledger).
    pub fn is_done(&self) -> bool {
        self.destination.exists()
    }
}

/// Terminal result for one work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { file: String },
    Skipped { file: String },
    Failed { file: String, reason: String },
}

impl Outcome {
    pub fn file(&self) -> &str {
        match self {
            Outcome::Success { file } | Outcome::Skipped { file } | Outcome::Failed { file, .. } => {
                file
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

/// Tri-count summary of one stage run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// The circuit breaker stopped the stage before every file was attempted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub aborted: bool,
    /// Source file names that ended in `Failed`, in processing order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_files: Vec<String>,
}

impl StageResult {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success { .. } => self.converted += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { file, .. } => {
                self.failed += 1;
                self.failed_files.push(file.clone());
            }
        }
    }

    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a Outcome>) -> Self {
        let mut result = Self::default();
        for o in outcomes {
            result.record(o);
        }
        result
    }

    /// Files accounted for (attempted or skipped).
    pub fn processed(&self) -> usize {
        self.converted + self.skipped + self.failed
    }

    /// Add another stage's counts into this one (failed names are not merged).
    pub fn absorb(&mut self, other: &StageResult) {
        self.converted += other.converted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.aborted |= other.aborted;
    }
}

/// Everything a run produced, in stage order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub input_dir: PathBuf,
    pub stages: Vec<StageReport>,
    pub total: StageResult,
}

/// One stage's entry in a [`PipelineSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub output_dir: PathBuf,
    pub result: StageResult,
}

impl PipelineSummary {
    pub fn result_for(&self, stage: Stage) -> Option<&StageResult> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.result)
    }
}
