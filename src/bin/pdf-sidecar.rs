//! CLI binary for pdf-sidecar.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, renders progress and prints the run summary.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_sidecar::{
    Pipeline, PipelineConfig, PipelineSummary, RestartReason, Stage, StageProgress, StageResult,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn fmt_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar per stage, replaced at every stage start. Per-file lines are
/// printed above the bar so they survive after it is cleared.
struct CliProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn println(&self, line: String) {
        match self.bar.lock().ok().and_then(|b| b.clone()) {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.bar.lock().ok().and_then(|b| b.clone()) {
            f(&bar);
        }
    }
}

impl StageProgress for CliProgress {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        eprintln!();
        eprintln!("{}", bold(&"═".repeat(60)));
        eprintln!("{} {}", cyan("◆"), bold(&stage.to_string()));
        eprintln!("{}", bold(&"═".repeat(60)));

        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix(format!("Stage {}", stage.number()));
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn on_stage_unavailable(&self, stage: Stage, missing: &Path, hint: &str) {
        if missing.exists() {
            eprintln!("{} {}: skipped, {}", yellow("⚠"), bold(&stage.to_string()), hint);
        } else {
            eprintln!(
                "{} {}: {} not found, {}",
                yellow("⚠"),
                bold(&stage.to_string()),
                missing.display(),
                hint
            );
        }
    }

    fn on_item_start(&self, _stage: Stage, index: usize, total: usize, file: &str) {
        self.with_bar(|bar| bar.set_message(format!("[{index}/{total}] {file}")));
    }

    fn on_item_skipped(&self, _stage: Stage, index: usize, total: usize, file: &str) {
        self.println(format!(
            "  {} [{:>3}/{:<3}] {}  {}",
            dim("↷"),
            index,
            total,
            file,
            dim("already exists")
        ));
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_item_complete(&self, _stage: Stage, index: usize, total: usize, file: &str) {
        self.println(format!("  {} [{:>3}/{:<3}] {}", green("✓"), index, total, file));
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_item_error(&self, _stage: Stage, index: usize, total: usize, file: &str, error: &str) {
        // Truncate very long tool output to keep the log tidy.
        let msg: String = if error.chars().count() > 100 {
            let mut s: String = error.chars().take(99).collect();
            s.push('…');
            s
        } else {
            error.to_string()
        };
        self.println(format!(
            "  {} [{:>3}/{:<3}] {}  {}",
            red("✗"),
            index,
            total,
            file,
            red(&msg)
        ));
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_retry(&self, _stage: Stage, file: &str, retry: usize, delay: Duration, error: &str) {
        self.println(format!(
            "    {} {} failed ({}), retry {} in {}",
            yellow("↻"),
            file,
            dim(error),
            retry,
            fmt_duration(delay)
        ));
    }

    fn on_restart(&self, _stage: Stage, reason: RestartReason) {
        let why = match reason {
            RestartReason::Periodic => "periodic restart",
            RestartReason::RetriesExhausted => "all retries failed",
        };
        self.println(format!("    {} Restarting Acrobat ({})", cyan("⟳"), why));
    }

    fn on_eta(&self, _stage: Stage, remaining: Duration) {
        self.with_bar(|bar| bar.set_message(format!("ETA {}", fmt_duration(remaining))));
    }

    fn on_circuit_open(&self, _stage: Stage, consecutive_failures: usize, manifest: Option<&Path>) {
        self.println(format!(
            "{} {} consecutive failures. Acrobat may be stuck behind a dialog.",
            red("✘"),
            consecutive_failures
        ));
        self.println(format!(
            "  {} dismiss any dialog or quit Acrobat, then re-run to resume",
            dim("→")
        ));
        if let Some(path) = manifest {
            self.println(format!("  {} failed files listed in {}", dim("→"), path.display()));
        }
    }

    fn on_stage_complete(&self, stage: Stage, result: &StageResult) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
        eprintln!("{} {}", stage_mark(result), tri_count(result));
        if result.aborted {
            eprintln!("  {}", red(&format!("{stage} aborted by circuit breaker")));
        }
    }
}

fn stage_mark(result: &StageResult) -> String {
    if result.failed == 0 {
        green("✔")
    } else if result.converted == 0 && result.skipped == 0 {
        red("✘")
    } else {
        yellow("⚠")
    }
}

fn tri_count(result: &StageResult) -> String {
    format!(
        "{} converted, {} skipped, {} failed",
        bold(&result.converted.to_string()),
        result.skipped,
        if result.failed > 0 {
            red(&result.failed.to_string())
        } else {
            result.failed.to_string()
        }
    )
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full pipeline over a folder of PDFs
  pdf-sidecar -i ~/Papers

  # Only Word → Markdown and cleanup, 8 workers
  pdf-sidecar -i ~/Papers -s 2 -s 3 -w 8

  # Re-run cleanup with a different rule file
  rm -r ~/Papers/"Sidecar Files"
  pdf-sidecar -i ~/Papers -s 3 --rules ~/rules/clinical.yaml

OUTPUT LAYOUT:
  <input>/_stage1_docx/      Word documents exported by Acrobat
  <input>/_stage2_raw_md/    raw pandoc Markdown
  <input>/Sidecar Files/     cleaned Markdown (final output)
  _failed_files.txt          written into a stage folder when files fail

Re-running is safe: files whose output already exists are skipped.

REQUIREMENTS:
  Stage 1  macOS, Adobe Acrobat, and the export AppleScript
  Stage 2  pandoc (brew install pandoc)
  Stage 3  nothing external
"#;

/// Batch-convert PDFs into cleaned Markdown sidecar files.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-sidecar",
    version,
    about = "Batch-convert a folder of PDFs into cleaned Markdown sidecar files",
    long_about = "Runs a folder of PDFs through three stages: PDF → Word (Adobe Acrobat), \
Word → Markdown (pandoc), and Markdown cleanup (heading detection and user regex rules). \
Each stage resumes where it left off.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder containing the PDFs.
    #[arg(short, long, env = "PDF_SIDECAR_INPUT")]
    input: PathBuf,

    /// Stage to run (1, 2 or 3). Repeat for several; default all.
    #[arg(short, long = "stage", env = "PDF_SIDECAR_STAGES", value_delimiter = ',',
          value_parser = clap::value_parser!(u8).range(1..=3))]
    stages: Vec<u8>,

    /// Parallel workers for stages 2 and 3 (default: CPU count − 1).
    #[arg(short, long, env = "PDF_SIDECAR_WORKERS",
          value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    workers: Option<usize>,

    /// Allow the machine to sleep during the run.
    #[arg(long, env = "PDF_SIDECAR_NO_CAFFEINATE")]
    no_caffeinate: bool,

    /// Rule configuration file (default: <input>/config_regex.yaml).
    #[arg(long, env = "PDF_SIDECAR_RULES")]
    rules: Option<PathBuf>,

    /// AppleScript used to export PDFs from Acrobat.
    #[arg(long, env = "PDF_SIDECAR_ACROBAT_SCRIPT")]
    acrobat_script: Option<PathBuf>,

    /// Do not tag finished files in Finder.
    #[arg(long, env = "PDF_SIDECAR_NO_TAG")]
    no_tag: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "PDF_SIDECAR_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_SIDECAR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_SIDECAR_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress display carries the per-file narration; library logs
    // only surface at warn and above unless asked for.
    let show_progress = !cli.quiet && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if !cli.input.is_dir() {
        bail!("Input folder does not exist: {}", cli.input.display());
    }

    let config = build_config(&cli)?;
    let mut pipeline = Pipeline::new(config);
    if show_progress {
        pipeline = pipeline.with_progress(CliProgress::new());
    }

    let summary = pipeline
        .run(&cli.input)
        .await
        .with_context(|| format!("Pipeline failed for {}", cli.input.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_summary(&summary);
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .prevent_sleep(!cli.no_caffeinate)
        .tag_outputs(!cli.no_tag);

    if !cli.stages.is_empty() {
        builder = builder.stages(cli.stages.iter().filter_map(|&n| Stage::from_number(n)));
    }
    if let Some(n) = cli.workers {
        builder = builder.workers(n);
    }
    if let Some(ref path) = cli.rules {
        builder = builder.rules_path(path);
    }
    if let Some(ref path) = cli.acrobat_script {
        builder = builder.acrobat_script(path);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(summary: &PipelineSummary) {
    eprintln!();
    eprintln!("{}", bold(&"═".repeat(60)));
    eprintln!("{}", bold("SUMMARY"));
    eprintln!("{}", bold(&"═".repeat(60)));
    for report in &summary.stages {
        eprintln!(
            "  {} {:<28} {}",
            stage_mark(&report.result),
            report.stage.to_string(),
            tri_count(&report.result)
        );
    }
    eprintln!("  {}", dim(&"─".repeat(56)));
    eprintln!(
        "  {} {:<28} {}",
        stage_mark(&summary.total),
        "Total",
        tri_count(&summary.total)
    );

    if let Some(last) = summary.stages.last() {
        eprintln!();
        eprintln!("Output: {}", bold(&last.output_dir.display().to_string()));
    }
}
