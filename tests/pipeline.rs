//! End-to-end pipeline tests.
//!
//! The external tools are replaced by in-process fakes: the "Acrobat" and
//! "pandoc" converters copy their input through unchanged, so the text
//! written into a `.pdf` fixture is what stage 3 finally cleans.

use async_trait::async_trait;
use host_hooks::{NoSleepInhibitor, NoopTagger};
use pdf_sidecar::{ConvertError, Converter, Pipeline, PipelineConfig, Stage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const PAPER: &str = "\
A Case of Something Rare

Abstract
We describe a patient.

DISCUSSION
The findings on 3/14/2021 were unusual.

References
[1] Someone et al. A paper. 2020.
";

/// Copies input to output; fails every attempt when `fail_all` is set.
#[derive(Default)]
struct CopyConverter {
    fail_all: bool,
    attempts: AtomicUsize,
    restarts: AtomicUsize,
}

#[async_trait]
impl Converter for CopyConverter {
    fn name(&self) -> &str {
        "copy"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(ConvertError::TimedOut {
                tool: "copy".into(),
                secs: 180,
            });
        }
        tokio::fs::copy(input, output)
            .await
            .map(|_| ())
            .map_err(|e| ConvertError::Internal(e.to_string()))
    }

    async fn restart(&self) -> Result<(), ConvertError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn config(stages: &[Stage], workers: usize) -> PipelineConfig {
    PipelineConfig::builder()
        .stages(stages.iter().copied())
        .workers(workers)
        .no_delays()
        .prevent_sleep(false)
        .build()
        .unwrap()
}

fn pipeline(config: PipelineConfig, acrobat: Arc<CopyConverter>) -> Pipeline {
    Pipeline::new(config)
        .with_pdf_converter(acrobat)
        .with_markdown_converter(Arc::new(CopyConverter::default()))
        .with_tagger(Arc::new(NoopTagger))
        .with_sleep_inhibitor(Arc::new(NoSleepInhibitor))
}

fn seed_pdfs(root: &Path, names: &[&str]) {
    for name in names {
        std::fs::write(root.join(name), PAPER).unwrap();
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_resumes_and_cleans() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    seed_pdfs(root, &["a.pdf", "b.pdf", "c.pdf"]);
    std::fs::create_dir(root.join("_stage1_docx")).unwrap();
    std::fs::write(root.join("_stage1_docx/b.docx"), PAPER).unwrap();

    let acrobat = Arc::new(CopyConverter::default());
    let summary = pipeline(config(&Stage::ALL, 2), Arc::clone(&acrobat))
        .run(root)
        .await
        .unwrap();

    let s1 = summary.result_for(Stage::PdfToWord).unwrap();
    assert_eq!((s1.converted, s1.skipped, s1.failed), (2, 1, 0));
    assert_eq!(acrobat.attempts.load(Ordering::SeqCst), 2);

    let s2 = summary.result_for(Stage::WordToMarkdown).unwrap();
    assert_eq!(s2.converted, 3);
    let s3 = summary.result_for(Stage::Cleanup).unwrap();
    assert_eq!(s3.converted, 3);
    assert_eq!(summary.total.converted, 8);

    let cleaned = std::fs::read_to_string(root.join("Sidecar Files/a.md")).unwrap();
    assert!(cleaned.contains("\n## Abstract\n"));
    assert!(cleaned.contains("\n## DISCUSSION\n"));
    assert!(cleaned.contains("\n---\n\n### References\n"));
    // default rule file was created and applied
    assert!(cleaned.contains("on ### 3/14/2021 were"));
    assert!(root.join("config_regex.yaml").exists());
    assert!(cleaned.ends_with("2020.\n"));
}

#[test]
fn second_run_skips_everything() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    seed_pdfs(root, &["a.pdf", "b.pdf"]);

    let p = pipeline(config(&Stage::ALL, 1), Arc::new(CopyConverter::default()));
    let first = tokio_test::block_on(p.run(root)).unwrap();
    assert_eq!(first.total.converted, 6);

    let second = tokio_test::block_on(p.run(root)).unwrap();
    assert_eq!(second.total.converted, 0);
    assert_eq!(second.total.skipped, 6);
    for stage in Stage::ALL {
        assert_eq!(second.result_for(stage).unwrap().skipped, 2);
    }
}

#[tokio::test]
async fn tripped_breaker_leaves_later_stages_running() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let names: Vec<String> = (0..8).map(|i| format!("p{i}.pdf")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    seed_pdfs(root, &refs);

    let acrobat = Arc::new(CopyConverter {
        fail_all: true,
        ..Default::default()
    });
    let summary = pipeline(
        config(&[Stage::PdfToWord, Stage::WordToMarkdown], 2),
        Arc::clone(&acrobat),
    )
    .run(root)
    .await
    .unwrap();

    let s1 = summary.result_for(Stage::PdfToWord).unwrap();
    assert!(s1.aborted);
    assert_eq!(s1.failed, 5);
    assert_eq!(acrobat.restarts.load(Ordering::SeqCst), 5);

    let manifest = std::fs::read_to_string(root.join("_stage1_docx/_failed_files.txt")).unwrap();
    let listed: Vec<&str> = manifest.lines().collect();
    assert_eq!(listed, vec!["p0.pdf", "p1.pdf", "p2.pdf", "p3.pdf", "p4.pdf"]);

    let s2 = summary.result_for(Stage::WordToMarkdown).unwrap();
    assert_eq!((s2.converted, s2.skipped, s2.failed), (0, 0, 0));
    assert!(summary.total.aborted);
}

#[tokio::test]
async fn cleanup_alone_uses_custom_rules() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir(root.join("_stage2_raw_md")).unwrap();
    std::fs::write(root.join("_stage2_raw_md/x.md"), PAPER).unwrap();
    let rules = root.join("my_rules.yaml");
    std::fs::write(
        &rules,
        "rules:\n  - name: Drop citations\n    find: '\\[\\d+\\] '\n    replace: ''\n",
    )
    .unwrap();

    let config = PipelineConfig::builder()
        .stages([Stage::Cleanup])
        .rules_path(&rules)
        .prevent_sleep(false)
        .build()
        .unwrap();
    let summary = pipeline(config, Arc::new(CopyConverter::default()))
        .run(root)
        .await
        .unwrap();

    assert_eq!(summary.stages.len(), 1);
    assert_eq!(summary.total.converted, 1);
    let cleaned = std::fs::read_to_string(root.join("Sidecar Files/x.md")).unwrap();
    assert!(cleaned.contains("\nSomeone et al."));
    assert!(cleaned.contains("on 3/14/2021 were"));
    assert!(!root.join("config_regex.yaml").exists());
}

#[tokio::test]
async fn summary_serialises_to_json() {
    let dir = TempDir::new().unwrap();
    let summary = pipeline(config(&[Stage::Cleanup], 1), Arc::new(CopyConverter::default()))
        .run(dir.path())
        .await
        .unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["stages"][0]["stage"], "Cleanup");
    assert_eq!(json["total"]["converted"], 0);
}
