//! Sequential runner for converters backed by a fragile stateful tool.
//!
//! ## Per-file state machine
//!
//! ```text
//! destination exists ───────────────────────────────▶ Skipped
//! attempt ──ok──▶ Success
//!    │ err
//!    ▼
//! wait 10 s, retry ──ok──▶ Success
//!    │ err
//!    ▼
//! wait 15 s, retry ──ok──▶ Success
//!    │ err
//!    ▼
//! restart tool, retry ──ok──▶ Success
//!    │ err
//!    ▼
//! Failed
//! ```
//!
//! ## Restart policy
//!
//! The tool is restarted proactively once every `restart_every` successful
//! conversions, and once more whenever a file exhausts its retries. The
//! restart is a graceful quit; the application relaunches on the next call.
//!
//! ## Circuit breaker
//!
//! `circuit_breaker_threshold` consecutive failed files (any success resets
//! the count) abort the stage. Files after the trip point are never
//! attempted and never appear in the failure manifest. A stuck modal dialog
//! in the application is the usual cause, and every further attempt would
//! only burn another full timeout.

use crate::config::{PipelineConfig, Stage};
use crate::outcome::{Outcome, StageResult, WorkItem};
use crate::pipeline::converter::Converter;
use crate::progress::{ProgressHandle, RestartReason};
use crate::runner::{record_failures, tag_output};
use host_hooks::FileTagger;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Timing and threshold knobs for [`ResilientRunner`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retry_delays: Vec<Duration>,
    pub inter_file_delay: Duration,
    pub restart_every: usize,
    pub circuit_breaker_threshold: usize,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            retry_delays: config.retry_delays.clone(),
            inter_file_delay: config.inter_file_delay,
            restart_every: config.restart_every,
            circuit_breaker_threshold: config.circuit_breaker_threshold.max(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Consecutive-failure counter.
#[derive(Debug, Default)]
struct CircuitState {
    consecutive_failures: usize,
}

impl CircuitState {
    fn success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failure; `true` when the breaker trips.
    fn failure(&mut self, threshold: usize) -> bool {
        self.consecutive_failures += 1;
        self.consecutive_failures >= threshold
    }
}

/// Running average of seconds per attempted file.
#[derive(Debug, Default)]
struct EtaTracker {
    attempted: u32,
    elapsed: Duration,
}

impl EtaTracker {
    fn record(&mut self, took: Duration) {
        self.attempted += 1;
        self.elapsed += took;
    }

    fn remaining(&self, files_left: usize) -> Option<Duration> {
        if self.attempted == 0 || files_left == 0 {
            return None;
        }
        let per_file = self.elapsed / self.attempted;
        Some(per_file.saturating_mul(files_left as u32))
    }
}

/// Drives one stage sequentially through a stateful converter.
pub struct ResilientRunner {
    stage: Stage,
    converter: Arc<dyn Converter>,
    policy: RetryPolicy,
    progress: ProgressHandle,
    tagger: Arc<dyn FileTagger>,
}

impl ResilientRunner {
    pub fn new(
        stage: Stage,
        converter: Arc<dyn Converter>,
        policy: RetryPolicy,
        progress: ProgressHandle,
        tagger: Arc<dyn FileTagger>,
    ) -> Self {
        Self {
            stage,
            converter,
            policy,
            progress,
            tagger,
        }
    }

    /// Process `items` in order. Never fails: per-file problems become
    /// `Failed` outcomes, a tripped breaker sets `aborted`.
    pub async fn run(&self, items: &[WorkItem], out_dir: &Path) -> StageResult {
        let total = items.len();
        let mut result = StageResult::default();
        let mut circuit = CircuitState::default();
        let mut eta = EtaTracker::default();
        let mut since_restart = 0usize;

        self.progress.on_stage_start(self.stage, total);
        info!("{}: {} file(s) to process", self.stage, total);

        for (i, item) in items.iter().enumerate() {
            let index = i + 1;
            let file = item.file_name();

            if item.is_done() {
                self.progress.on_item_skipped(self.stage, index, total, &file);
                result.record(&Outcome::Skipped { file });
                continue;
            }

            if self.policy.restart_every > 0 && since_restart >= self.policy.restart_every {
                self.restart(RestartReason::Periodic).await;
                since_restart = 0;
            }

            self.progress.on_item_start(self.stage, index, total, &file);
            let started = Instant::now();
            let outcome = self.convert_with_retries(item, &file, &mut since_restart).await;
            eta.record(started.elapsed());
            result.record(&outcome);

            match &outcome {
                Outcome::Success { .. } => {
                    circuit.success();
                    since_restart += 1;
                    tag_output(&self.tagger, item.destination()).await;
                    self.progress.on_item_complete(self.stage, index, total, &file);
                }
                Outcome::Failed { reason, .. } => {
                    self.progress
                        .on_item_error(self.stage, index, total, &file, reason);
                    if circuit.failure(self.policy.circuit_breaker_threshold) {
                        result.aborted = true;
                        error!(
                            "{}: {} consecutive failures, aborting. The application is \
                             probably stuck behind a modal dialog; dismiss it or quit the \
                             application, then re-run to resume.",
                            self.stage, circuit.consecutive_failures
                        );
                        let manifest = record_failures(out_dir, &result.failed_files);
                        self.progress.on_circuit_open(
                            self.stage,
                            circuit.consecutive_failures,
                            manifest.as_deref(),
                        );
                        break;
                    }
                }
                Outcome::Skipped { .. } => {}
            }

            if index < total {
                if let Some(left) = eta.remaining(total - index) {
                    self.progress.on_eta(self.stage, left);
                }
                tokio::time::sleep(self.policy.inter_file_delay).await;
            }
        }

        if !result.aborted {
            record_failures(out_dir, &result.failed_files);
        }

        info!(
            "{}: {} converted, {} skipped, {} failed",
            self.stage, result.converted, result.skipped, result.failed
        );
        self.progress.on_stage_complete(self.stage, &result);
        result
    }

    /// One file's full attempt sequence.
    async fn convert_with_retries(
        &self,
        item: &WorkItem,
        file: &str,
        since_restart: &mut usize,
    ) -> Outcome {
        let mut last_err = match self.attempt(item).await {
            Ok(()) => return Outcome::Success { file: file.to_string() },
            Err(e) => e,
        };

        for (n, delay) in self.policy.retry_delays.iter().enumerate() {
            let retry = n + 1;
            warn!(
                "{}: {} failed ({}); retry {} in {:?}",
                self.stage, file, last_err, retry, delay
            );
            self.progress
                .on_retry(self.stage, file, retry, *delay, &last_err);
            tokio::time::sleep(*delay).await;

            match self.attempt(item).await {
                Ok(()) => {
                    info!("{}: {} succeeded on retry {}", self.stage, file, retry);
                    return Outcome::Success { file: file.to_string() };
                }
                Err(e) => last_err = e,
            }
        }

        warn!("{}: all retries failed for {}", self.stage, file);
        self.restart(RestartReason::RetriesExhausted).await;
        *since_restart = 0;

        match self.attempt(item).await {
            Ok(()) => {
                info!("{}: {} succeeded after restart", self.stage, file);
                Outcome::Success { file: file.to_string() }
            }
            Err(e) => Outcome::Failed {
                file: file.to_string(),
                reason: e,
            },
        }
    }

    async fn attempt(&self, item: &WorkItem) -> Result<(), String> {
        self.converter
            .convert(item.source(), item.destination())
            .await
            .map_err(|e| e.to_string())
    }

    async fn restart(&self, reason: RestartReason) {
        self.progress.on_restart(self.stage, reason);
        if let Err(e) = self.converter.restart().await {
            warn!("{}: restart of {} failed: {}", self.stage, self.converter.name(), e);
        }
    }
}
