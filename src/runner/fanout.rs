//! Bounded-parallel runner for stateless converters.
//!
//! Every work item becomes its own task; at most `workers` run at once.
//! A task that panics is reported as a `Failed` outcome for its file and the
//! rest of the batch carries on. With `workers <= 1` the items run in input
//! order on the current task, which is how the parallel path is checked for
//! equivalence.

use crate::config::Stage;
use crate::outcome::{Outcome, StageResult, WorkItem};
use crate::pipeline::converter::Converter;
use crate::progress::ProgressHandle;
use crate::runner::{record_failures, tag_output};
use futures::stream::{self, StreamExt};
use host_hooks::FileTagger;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct FanOutRunner {
    stage: Stage,
    converter: Arc<dyn Converter>,
    workers: usize,
    progress: ProgressHandle,
    tagger: Arc<dyn FileTagger>,
}

impl FanOutRunner {
    pub fn new(
        stage: Stage,
        converter: Arc<dyn Converter>,
        workers: usize,
        progress: ProgressHandle,
        tagger: Arc<dyn FileTagger>,
    ) -> Self {
        Self {
            stage,
            converter,
            workers: workers.max(1),
            progress,
            tagger,
        }
    }

    /// Run the stage and write the failure manifest when anything failed.
    pub async fn run(&self, items: &[WorkItem], out_dir: &Path) -> StageResult {
        self.progress.on_stage_start(self.stage, items.len());
        info!(
            "{}: {} file(s) to process with {} worker(s)",
            self.stage,
            items.len(),
            self.workers
        );

        let outcomes = self.run_items(items).await;
        let result = StageResult::from_outcomes(&outcomes);
        record_failures(out_dir, &result.failed_files);

        info!(
            "{}: {} converted, {} skipped, {} failed",
            self.stage, result.converted, result.skipped, result.failed
        );
        self.progress.on_stage_complete(self.stage, &result);
        result
    }

    /// One outcome per item. Order follows input on the sequential path and
    /// completion on the parallel path.
    pub async fn run_items(&self, items: &[WorkItem]) -> Vec<Outcome> {
        if self.workers <= 1 {
            self.run_sequential(items).await
        } else {
            self.run_parallel(items).await
        }
    }

    async fn run_sequential(&self, items: &[WorkItem]) -> Vec<Outcome> {
        let total = items.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, item) in items.iter().enumerate() {
            let index = i + 1;
            if !item.is_done() {
                self.progress
                    .on_item_start(self.stage, index, total, &item.file_name());
            }
            let outcome = convert_one(Arc::clone(&self.converter), item.clone()).await;
            self.report(&outcome, item, index, total).await;
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_parallel(&self, items: &[WorkItem]) -> Vec<Outcome> {
        let total = items.len();
        let completed = AtomicUsize::new(0);

        stream::iter(items.iter().cloned().map(|item| {
            let converter = Arc::clone(&self.converter);
            let file = item.file_name();
            let completed = &completed;
            async move {
                let handle = tokio::spawn(convert_one(converter, item.clone()));
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => Outcome::Failed {
                        file,
                        reason: if e.is_panic() {
                            "converter panicked".to_string()
                        } else {
                            format!("task cancelled: {e}")
                        },
                    },
                };
                let index = completed.fetch_add(1, Ordering::SeqCst) + 1;
                self.report(&outcome, &item, index, total).await;
                outcome
            }
        }))
        .buffer_unordered(self.workers)
        .collect()
        .await
    }

    async fn report(&self, outcome: &Outcome, item: &WorkItem, index: usize, total: usize) {
        match outcome {
            Outcome::Success { file } => {
                tag_output(&self.tagger, item.destination()).await;
                self.progress.on_item_complete(self.stage, index, total, file);
            }
            Outcome::Skipped { file } => {
                self.progress.on_item_skipped(self.stage, index, total, file);
            }
            Outcome::Failed { file, reason } => {
                self.progress
                    .on_item_error(self.stage, index, total, file, reason);
            }
        }
    }
}

/// Skip-or-convert for a single item. Owns its inputs so it can be spawned.
async fn convert_one(converter: Arc<dyn Converter>, item: WorkItem) -> Outcome {
    let file = item.file_name();
    if item.is_done() {
        debug!("Skipping {}: output exists", file);
        return Outcome::Skipped { file };
    }
    match converter.convert(item.source(), item.destination()).await {
        Ok(()) => Outcome::Success { file },
        Err(e) => Outcome::Failed {
            file,
            reason: e.to_string(),
        },
    }
}
