//! Stage 3: turn pandoc's raw Markdown into the final sidecar document.
//!
//! ## Pass Order
//!
//! 1. Normalise line endings (CRLF → LF) so line splitting is reliable
//! 2. Strip invisible Unicode left over from the PDF text layer
//! 3. Trim trailing whitespace per line
//! 4. Promote section titles to headings ([`crate::pipeline::headings`])
//! 5. Apply the user's substitution rules ([`crate::rules::RuleEngine`])
//! 6. Collapse runs of blank lines introduced by heading expansion
//! 7. End the file with exactly one newline
//!
//! Heading annotation runs before the user's rules so a rule can rely on
//! `## ` markers being present.

use crate::error::ConvertError;
use crate::pipeline::converter::Converter;
use crate::pipeline::headings::{self, HeadingOptions};
use crate::rules::RuleEngine;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Run every cleanup pass over `input`.
pub fn clean_markdown(input: &str, rules: &RuleEngine, opts: HeadingOptions) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = headings::annotate_with(&s, opts);
    let s = rules.apply(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{2060}'], "")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// At most one blank line between blocks.
fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_matches('\n');
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}

/// Write `contents` to `path` through a temp file in the same directory.
///
/// A crash mid-write leaves only the temp file, never a partial `path`, so
/// the existence-based resume check stays honest.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// The stage-3 "converter": read, clean, write.
///
/// Holds the compiled rules behind an `Arc` so every worker shares one copy.
#[derive(Debug, Clone)]
pub struct MarkdownCleaner {
    rules: Arc<RuleEngine>,
    opts: HeadingOptions,
}

impl MarkdownCleaner {
    pub fn new(rules: Arc<RuleEngine>) -> Self {
        Self {
            rules,
            opts: HeadingOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: HeadingOptions) -> Self {
        self.opts = opts;
        self
    }
}

#[async_trait]
impl Converter for MarkdownCleaner {
    fn name(&self) -> &str {
        "cleanup"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let raw = tokio::fs::read(input)
            .await
            .map_err(|e| ConvertError::io(input, e))?;
        let text = String::from_utf8_lossy(&raw).into_owned();

        // Regex passes are CPU-bound; keep them off the async workers.
        let rules = Arc::clone(&self.rules);
        let opts = self.opts;
        let out_path = output.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let cleaned = clean_markdown(&text, &rules, opts);
            write_atomic(&out_path, cleaned.as_bytes()).map_err(|e| ConvertError::io(&out_path, e))
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("cleanup task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;
    use tempfile::TempDir;

    #[test]
    fn full_pass_annotates_and_applies_rules() {
        let rules = RuleEngine::new(&[Rule::new("dates", r"(\d{1,2}/\d{1,2}/\d{4})", r"### \1")]);
        let input = "Intro text\r\nDISCUSSION\r\nSeen 1/2/2020.   \r\nReferences\r\n[1] A.";
        let out = clean_markdown(input, &rules, HeadingOptions::default());
        assert_eq!(
            out,
            "Intro text\n\n## DISCUSSION\n\nSeen ### 1/2/2020.\n\n---\n\n### References\n\n[1] A.\n"
        );
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn blank_runs_collapse_to_one() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn final_newline() {
        assert_eq!(ensure_final_newline("x"), "x\n");
        assert_eq!(ensure_final_newline("\n\nx\n\n"), "x\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[tokio::test]
    async fn cleaner_writes_destination() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("paper.md");
        let output = dir.path().join("out.md");
        std::fs::write(&input, "Abstract\nBody").unwrap();

        let cleaner = MarkdownCleaner::new(Arc::new(RuleEngine::empty()));
        cleaner.convert(&input, &output).await.unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text, "## Abstract\n\nBody\n");
    }

    #[tokio::test]
    async fn cleaner_reports_missing_input() {
        let dir = TempDir::new().unwrap();
        let cleaner = MarkdownCleaner::new(Arc::new(RuleEngine::empty()));
        let err = cleaner
            .convert(&dir.path().join("absent.md"), &dir.path().join("out.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
        assert!(!dir.path().join("out.md").exists());
    }
}
