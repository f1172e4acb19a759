//! # pdf-sidecar
//!
//! Batch-convert a folder of PDF documents into cleaned Markdown "sidecar"
//! files suitable for ingestion by note-taking and retrieval tools.
//!
//! ## Why this crate?
//!
//! Direct PDF-to-text extraction loses structure: headings become plain
//! lines, tables fall apart and multi-column text interleaves. Exporting
//! through a word processor format first keeps paragraphs and tables
//! intact, and pandoc turns that into reasonable Markdown. What remains is
//! to recover the section headings the export flattened, and to apply the
//! user's own text substitutions.
//!
//! ## Pipeline Overview
//!
//! ```text
//! <root>/*.pdf
//!  │
//!  ├─ 1. PDF → Word       Adobe Acrobat via osascript; sequential, retried,
//!  │                      periodically restarted, circuit breaker
//!  ├─ 2. Word → Markdown  pandoc; bounded parallel pool
//!  └─ 3. Clean Markdown   heading detection + YAML regex rules; parallel
//!                         ▼
//!               <root>/Sidecar Files/*.md
//! ```
//!
//! Every stage skips inputs whose output already exists, so an interrupted
//! run resumes where it stopped.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_sidecar::{Pipeline, PipelineConfig, Stage};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .stages([Stage::WordToMarkdown, Stage::Cleanup])
//!         .build()?;
//!     let summary = Pipeline::new(config).run(Path::new("papers")).await?;
//!     eprintln!(
//!         "{} converted, {} skipped, {} failed",
//!         summary.total.converted, summary.total.skipped, summary.total.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-sidecar` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-sidecar = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod pipeline;
pub mod progress;
pub mod rules;
pub mod runner;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DirLayout, PipelineConfig, PipelineConfigBuilder, Stage};
pub use error::{ConvertError, PipelineError};
pub use orchestrator::Pipeline;
pub use outcome::{Outcome, PipelineSummary, StageReport, StageResult, WorkItem};
pub use pipeline::cleanup::{clean_markdown, MarkdownCleaner};
pub use pipeline::converter::{CommandConverter, Converter};
pub use pipeline::headings::{HeadingOptions, HeadingTier};
pub use progress::{NoopProgress, ProgressHandle, RestartReason, StageProgress};
pub use rules::{apply_rules, load_rules, Rule, RuleConfig, RuleEngine};
pub use runner::{FanOutRunner, ResilientRunner, RetryPolicy};
