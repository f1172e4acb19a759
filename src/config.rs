//! Configuration types for a pipeline run.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Every timing knob of the resilient runner lives
//! here, so a test can shrink a 10-second retry delay to zero without touching
//! the runner itself.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the failure manifest written into a stage's output directory.
pub const FAILURE_MANIFEST: &str = "_failed_files.txt";

/// Default rule configuration file name, resolved against the input root.
pub const DEFAULT_RULES_FILE: &str = "config_regex.yaml";

/// Configuration for a pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_sidecar::{PipelineConfig, Stage};
///
/// let config = PipelineConfig::builder()
///     .stages([Stage::WordToMarkdown, Stage::Cleanup])
///     .workers(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.stages.len(), 2);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Stages to run. Always executed in ascending order. Default: all three.
    pub stages: BTreeSet<Stage>,

    /// Worker pool size for stages 2 and 3. Default: available parallelism − 1, minimum 1.
    ///
    /// A value of 1 selects the sequential path, which narrates every file in
    /// input order.
    pub workers: usize,

    /// Directory names for the intermediate and final outputs.
    pub layout: DirLayout,

    /// Delays before each retry of a failed stage-1 conversion. Default: 10 s, 15 s.
    ///
    /// After the last delay's attempt fails, the external tool is restarted
    /// and the file gets one more attempt.
    pub retry_delays: Vec<Duration>,

    /// Pause after each attempted stage-1 file when more files remain. Default: 5 s.
    pub inter_file_delay: Duration,

    /// Restart the stage-1 tool after this many successful conversions. Default: 10.
    ///
    /// `0` disables the periodic restart.
    pub restart_every: usize,

    /// Consecutive stage-1 failures that abort the stage. Default: 5.
    pub circuit_breaker_threshold: usize,

    /// Timeout for one PDF→Word conversion, in seconds. Default: 180.
    pub pdf_timeout_secs: u64,

    /// Timeout for one Word→Markdown conversion, in seconds. Default: 60.
    pub markdown_timeout_secs: u64,

    /// Export script passed to `osascript` for PDF→Word. Default: `acrobat_export.scpt`.
    pub acrobat_script: PathBuf,

    /// Rule configuration file. `None` resolves to `<root>/config_regex.yaml`.
    pub rules_path: Option<PathBuf>,

    /// Keep the machine awake for the duration of the run. Default: true.
    pub prevent_sleep: bool,

    /// Tag successfully written outputs in the host file manager. Default: true.
    pub tag_outputs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: Stage::ALL.into_iter().collect(),
            workers: default_workers(),
            layout: DirLayout::default(),
            retry_delays: vec![Duration::from_secs(10), Duration::from_secs(15)],
            inter_file_delay: Duration::from_secs(5),
            restart_every: 10,
            circuit_breaker_threshold: 5,
            pdf_timeout_secs: 180,
            markdown_timeout_secs: 60,
            acrobat_script: PathBuf::from("acrobat_export.scpt"),
            rules_path: None,
            prevent_sleep: true,
            tag_outputs: true,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("stages", &self.stages)
            .field("workers", &self.workers)
            .field("layout", &self.layout)
            .field("retry_delays", &self.retry_delays)
            .field("inter_file_delay", &self.inter_file_delay)
            .field("restart_every", &self.restart_every)
            .field("circuit_breaker_threshold", &self.circuit_breaker_threshold)
            .field("prevent_sleep", &self.prevent_sleep)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The rule file for a run rooted at `root`.
    pub fn resolve_rules_path(&self, root: &Path) -> PathBuf {
        self.rules_path
            .clone()
            .unwrap_or_else(|| root.join(DEFAULT_RULES_FILE))
    }
}

/// Available parallelism minus one, never below 1.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.config.stages = stages.into_iter().collect();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn layout(mut self, layout: DirLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.config.retry_delays = delays;
        self
    }

    pub fn inter_file_delay(mut self, delay: Duration) -> Self {
        self.config.inter_file_delay = delay;
        self
    }

    /// Zero every retry and inter-file delay. Useful for tests and dry runs
    /// against tools that do not need a cool-down.
    pub fn no_delays(mut self) -> Self {
        self.config.retry_delays = vec![Duration::ZERO; self.config.retry_delays.len()];
        self.config.inter_file_delay = Duration::ZERO;
        self
    }

    pub fn restart_every(mut self, n: usize) -> Self {
        self.config.restart_every = n;
        self
    }

    pub fn circuit_breaker_threshold(mut self, n: usize) -> Self {
        self.config.circuit_breaker_threshold = n;
        self
    }

    pub fn pdf_timeout_secs(mut self, secs: u64) -> Self {
        self.config.pdf_timeout_secs = secs;
        self
    }

    pub fn markdown_timeout_secs(mut self, secs: u64) -> Self {
        self.config.markdown_timeout_secs = secs;
        self
    }

    pub fn acrobat_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.acrobat_script = path.into();
        self
    }

    pub fn rules_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.rules_path = Some(path.into());
        self
    }

    pub fn prevent_sleep(mut self, v: bool) -> Self {
        self.config.prevent_sleep = v;
        self
    }

    pub fn tag_outputs(mut self, v: bool) -> Self {
        self.config.tag_outputs = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.stages.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "At least one stage must be selected".into(),
            ));
        }
        if c.workers == 0 {
            return Err(PipelineError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.circuit_breaker_threshold == 0 {
            return Err(PipelineError::InvalidConfig(
                "Circuit breaker threshold must be ≥ 1".into(),
            ));
        }
        if c.pdf_timeout_secs == 0 || c.markdown_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "Converter timeouts must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Stages and layout ────────────────────────────────────────────────────

/// One of the three ordered conversion phases.
///
/// The derived ordering is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// PDF → Word, through the document application. Sequential only.
    PdfToWord,
    /// Word → Markdown, through pandoc.
    WordToMarkdown,
    /// Heading annotation and rule cleanup, in process.
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::PdfToWord, Stage::WordToMarkdown, Stage::Cleanup];

    /// Map a 1-based stage number to a stage.
    pub fn from_number(n: u8) -> Option<Stage> {
        match n {
            1 => Some(Stage::PdfToWord),
            2 => Some(Stage::WordToMarkdown),
            3 => Some(Stage::Cleanup),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Stage::PdfToWord => 1,
            Stage::WordToMarkdown => 2,
            Stage::Cleanup => 3,
        }
    }

    /// Human-readable banner label.
    pub fn label(self) -> &'static str {
        match self {
            Stage::PdfToWord => "PDF → Word",
            Stage::WordToMarkdown => "Word → Markdown",
            Stage::Cleanup => "Clean Markdown",
        }
    }

    /// Extension (lower-case, no dot) of the files this stage consumes.
    pub fn input_extension(self) -> &'static str {
        match self {
            Stage::PdfToWord => "pdf",
            Stage::WordToMarkdown => "docx",
            Stage::Cleanup => "md",
        }
    }

    /// Extension of the files this stage produces.
    pub fn output_extension(self) -> &'static str {
        match self {
            Stage::PdfToWord => "docx",
            Stage::WordToMarkdown | Stage::Cleanup => "md",
        }
    }

    /// The stage whose output this stage reads, if any.
    pub fn prerequisite(self) -> Option<Stage> {
        match self {
            Stage::PdfToWord => None,
            Stage::WordToMarkdown => Some(Stage::PdfToWord),
            Stage::Cleanup => Some(Stage::WordToMarkdown),
        }
    }

    /// Directory this stage reads from.
    pub fn input_dir(self, root: &Path, layout: &DirLayout) -> PathBuf {
        match self.prerequisite() {
            None => root.to_path_buf(),
            Some(prev) => prev.output_dir(root, layout),
        }
    }

    /// Directory this stage writes to.
    pub fn output_dir(self, root: &Path, layout: &DirLayout) -> PathBuf {
        match self {
            Stage::PdfToWord => root.join(&layout.docx_dir),
            Stage::WordToMarkdown => root.join(&layout.raw_markdown_dir),
            Stage::Cleanup => root.join(&layout.output_dir),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stage {} ({})", self.number(), self.label())
    }
}

/// Names of the per-stage output folders under the input root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirLayout {
    /// Stage 1 output. Default: `_stage1_docx`.
    pub docx_dir: String,
    /// Stage 2 output. Default: `_stage2_raw_md`.
    pub raw_markdown_dir: String,
    /// Stage 3 output. Default: `Sidecar Files`.
    pub output_dir: String,
}

impl Default for DirLayout {
    fn default() -> Self {
        Self {
            docx_dir: "_stage1_docx".into(),
            raw_markdown_dir: "_stage2_raw_md".into(),
            output_dir: "Sidecar Files".into(),
        }
    }
}
