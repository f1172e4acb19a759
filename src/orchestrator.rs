//! Top-level pipeline: run the selected stages over one input folder.
//!
//! ```text
//! <root>/*.pdf ──1──▶ _stage1_docx/*.docx ──2──▶ _stage2_raw_md/*.md ──3──▶ Sidecar Files/*.md
//! ```
//!
//! Stages always run in ascending order, whatever order they were selected
//! in. A stage whose input folder does not exist yet, or whose folders
//! cannot be read or created, is reported as unavailable and contributes
//! zero counts. The later stages still run.
//!
//! Stage 1 runs through the [`ResilientRunner`]; stages 2 and 3 through the
//! [`FanOutRunner`]. The machine is kept awake for the whole run when
//! [`PipelineConfig::prevent_sleep`] is set.

use crate::config::{PipelineConfig, Stage};
use crate::error::PipelineError;
use crate::outcome::{PipelineSummary, StageReport, StageResult};
use crate::pipeline::cleanup::MarkdownCleaner;
use crate::pipeline::converter::{CommandConverter, Converter};
use crate::pipeline::scan::discover;
use crate::progress::{NoopProgress, ProgressHandle};
use crate::rules::{load_rules, RuleEngine};
use crate::runner::{FanOutRunner, ResilientRunner, RetryPolicy};
use host_hooks::{FileTagger, NoopTagger, SleepGuard, SleepInhibitor};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A configured pipeline. Cheap to build; [`Pipeline::run`] does the work.
pub struct Pipeline {
    config: PipelineConfig,
    pdf_converter: Arc<dyn Converter>,
    markdown_converter: Arc<dyn Converter>,
    tagger: Arc<dyn FileTagger>,
    inhibitor: Arc<dyn SleepInhibitor>,
    progress: ProgressHandle,
}

impl Pipeline {
    /// A pipeline using Acrobat and pandoc, with the host hooks for this platform.
    pub fn new(config: PipelineConfig) -> Self {
        let pdf_converter: Arc<dyn Converter> = Arc::new(CommandConverter::acrobat(
            &config.acrobat_script,
            config.pdf_timeout_secs,
        ));
        let markdown_converter: Arc<dyn Converter> =
            Arc::new(CommandConverter::pandoc(config.markdown_timeout_secs));
        Self {
            config,
            pdf_converter,
            markdown_converter,
            tagger: default_tagger(),
            inhibitor: default_inhibitor(),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_pdf_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.pdf_converter = converter;
        self
    }

    pub fn with_markdown_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.markdown_converter = converter;
        self
    }

    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn FileTagger>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn with_sleep_inhibitor(mut self, inhibitor: Arc<dyn SleepInhibitor>) -> Self {
        self.inhibitor = inhibitor;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every selected stage over `root`.
    ///
    /// Only a missing root is an error. A stage that cannot list its input
    /// or create its output folder is reported as unavailable and the
    /// remaining stages still run. Per-file failures and a tripped circuit
    /// breaker are reported in the returned summary.
    pub async fn run(&self, root: &Path) -> Result<PipelineSummary, PipelineError> {
        if !root.is_dir() {
            return Err(PipelineError::InputDirNotFound {
                path: root.to_path_buf(),
            });
        }

        let _awake: SleepGuard = if self.config.prevent_sleep {
            self.inhibitor.inhibit()
        } else {
            SleepGuard::inactive()
        };

        let mut summary = PipelineSummary {
            input_dir: root.to_path_buf(),
            ..Default::default()
        };

        for &stage in &self.config.stages {
            let output_dir = stage.output_dir(root, &self.config.layout);
            let result = self.run_stage(stage, root).await;
            summary.total.absorb(&result);
            summary.stages.push(StageReport {
                stage,
                output_dir,
                result,
            });
        }

        info!(
            "Pipeline finished: {} converted, {} skipped, {} failed",
            summary.total.converted, summary.total.skipped, summary.total.failed
        );
        Ok(summary)
    }

    /// Run one stage. Folder-level errors end this stage only.
    async fn run_stage(&self, stage: Stage, root: &Path) -> StageResult {
        match self.try_run_stage(stage, root).await {
            Ok(result) => result,
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| stage.input_dir(root, &self.config.layout));
                warn!("{}: skipped: {}", stage, e);
                self.progress.on_stage_unavailable(stage, &path, &e.to_string());
                StageResult::default()
            }
        }
    }

    async fn try_run_stage(&self, stage: Stage, root: &Path) -> Result<StageResult, PipelineError> {
        let layout = &self.config.layout;
        let in_dir = stage.input_dir(root, layout);
        let out_dir = stage.output_dir(root, layout);

        if !in_dir.is_dir() {
            let hint = match stage.prerequisite() {
                Some(prev) => format!("run stage {} first", prev.number()),
                None => "check the input folder".to_string(),
            };
            warn!("{}: {} not found, {}", stage, in_dir.display(), hint);
            self.progress.on_stage_unavailable(stage, &in_dir, &hint);
            return Ok(StageResult::default());
        }

        std::fs::create_dir_all(&out_dir).map_err(|e| PipelineError::OutputWriteFailed {
            path: out_dir.clone(),
            source: e,
        })?;

        let items = discover(
            &in_dir,
            stage.input_extension(),
            &out_dir,
            stage.output_extension(),
        )?;

        let result = match stage {
            Stage::PdfToWord => {
                ResilientRunner::new(
                    stage,
                    Arc::clone(&self.pdf_converter),
                    RetryPolicy::from_config(&self.config),
                    Arc::clone(&self.progress),
                    self.effective_tagger(),
                )
                .run(&items, &out_dir)
                .await
            }
            Stage::WordToMarkdown => {
                self.fan_out(stage, Arc::clone(&self.markdown_converter))
                    .run(&items, &out_dir)
                    .await
            }
            Stage::Cleanup => {
                let cleaner = MarkdownCleaner::new(Arc::new(self.load_rule_engine(root)));
                self.fan_out(stage, Arc::new(cleaner))
                    .run(&items, &out_dir)
                    .await
            }
        };
        Ok(result)
    }

    fn fan_out(&self, stage: Stage, converter: Arc<dyn Converter>) -> FanOutRunner {
        FanOutRunner::new(
            stage,
            converter,
            self.config.workers,
            Arc::clone(&self.progress),
            self.effective_tagger(),
        )
    }

    fn effective_tagger(&self) -> Arc<dyn FileTagger> {
        if self.config.tag_outputs {
            Arc::clone(&self.tagger)
        } else {
            Arc::new(NoopTagger)
        }
    }

    /// Load and compile the rule file. An unreadable or malformed file means
    /// no rules, not a failed stage.
    fn load_rule_engine(&self, root: &Path) -> RuleEngine {
        let path = self.config.resolve_rules_path(root);
        match load_rules(&path) {
            Ok(rules) => {
                let engine = RuleEngine::new(&rules);
                info!("Loaded {} rule(s) from {}", engine.len(), path.display());
                engine
            }
            Err(e) => {
                warn!("{}; continuing without rules", e);
                RuleEngine::empty()
            }
        }
    }
}

#[cfg(target_os = "macos")]
fn default_tagger() -> Arc<dyn FileTagger> {
    Arc::new(host_hooks::FinderTagger::default())
}

#[cfg(not(target_os = "macos"))]
fn default_tagger() -> Arc<dyn FileTagger> {
    Arc::new(NoopTagger)
}

#[cfg(target_os = "macos")]
fn default_inhibitor() -> Arc<dyn SleepInhibitor> {
    Arc::new(host_hooks::Caffeinate::default())
}

#[cfg(not(target_os = "macos"))]
fn default_inhibitor() -> Arc<dyn SleepInhibitor> {
    Arc::new(host_hooks::NoSleepInhibitor)
}
