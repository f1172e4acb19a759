//! Heading annotation: promote plain lines to Markdown headings.
//!
//! Word documents exported from PDFs rarely carry real heading styles, so
//! pandoc emits section titles as ordinary paragraphs. This module walks the
//! Markdown line by line and promotes lines that *look like* section titles.
//!
//! ## Tier Order
//!
//! Tiers are evaluated top to bottom and the first match wins:
//!
//! | Tier | Example | Output |
//! |------|---------|--------|
//! | structural section | `2. Methods` | `## 2. Methods` |
//! | clinical section | `Differential Diagnosis` | `## Differential Diagnosis` |
//! | patient education | `When to See a Doctor` | `## When to See a Doctor` |
//! | case report | `Case 2:` | `## Case 2:` |
//! | back matter | `References` | `---` then `### References` |
//! | question | `What causes gout?` | `### What causes gout?` |
//! | all-caps fallback | `PATIENT SELECTION` | `## PATIENT SELECTION` |
//!
//! Named tiers are anchored to the whole trimmed line, so `Results were
//! mixed` is never promoted. The fallback only fires when no named tier
//! matched, which keeps `RESULTS` a named-section heading.
//!
//! This is a heuristic. Some false positives and misses are expected.

use once_cell::sync::Lazy;
use regex::Regex;

/// Classification of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingTier {
    StructuralSection,
    ClinicalSection,
    PatientEducation,
    QuestionHeading,
    CaseReport,
    BackMatter,
    AllCapsFallback,
    None,
}

/// Tuning for the all-caps fallback.
#[derive(Debug, Clone, Copy)]
pub struct HeadingOptions {
    /// Require fewer than 12 words and no trailing period for the fallback.
    pub strict_fallback: bool,
}

impl Default for HeadingOptions {
    fn default() -> Self {
        Self {
            strict_fallback: true,
        }
    }
}

/// Annotate `text` with the default options.
pub fn annotate(text: &str) -> String {
    annotate_with(text, HeadingOptions::default())
}

/// Annotate `text`, promoting matching lines to headings.
///
/// Line order and blank lines are preserved; promoted lines expand into the
/// multi-line heading form of their tier.
pub fn annotate_with(text: &str, opts: HeadingOptions) -> String {
    let mut out: Vec<String> = Vec::with_capacity(text.len() / 32 + 1);

    for line in text.split('\n') {
        let candidate = strip_strong(line.trim());
        match classify_with(line, opts) {
            HeadingTier::StructuralSection
            | HeadingTier::ClinicalSection
            | HeadingTier::PatientEducation
            | HeadingTier::CaseReport
            | HeadingTier::AllCapsFallback => {
                out.push(String::new());
                out.push(format!("## {candidate}"));
                out.push(String::new());
            }
            HeadingTier::BackMatter => {
                out.push(String::new());
                out.push("---".to_string());
                out.push(String::new());
                out.push(format!("### {candidate}"));
                out.push(String::new());
            }
            HeadingTier::QuestionHeading => {
                out.push(String::new());
                out.push(format!("### {candidate}"));
                out.push(String::new());
            }
            HeadingTier::None => out.push(line.to_string()),
        }
    }

    out.join("\n")
}

/// Classify a single line with the default options.
pub fn classify(line: &str) -> HeadingTier {
    classify_with(line, HeadingOptions::default())
}

/// Classify a single line. Total: every input maps to some tier.
pub fn classify_with(line: &str, opts: HeadingOptions) -> HeadingTier {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return HeadingTier::None;
    }
    let text = strip_strong(trimmed);
    if text.is_empty() {
        return HeadingTier::None;
    }

    if RE_STRUCTURAL.is_match(text) {
        HeadingTier::StructuralSection
    } else if RE_CLINICAL.is_match(text) {
        HeadingTier::ClinicalSection
    } else if RE_PATIENT_ED.is_match(text) {
        HeadingTier::PatientEducation
    } else if RE_CASE_REPORT.is_match(text) {
        HeadingTier::CaseReport
    } else if RE_BACK_MATTER.is_match(text) {
        HeadingTier::BackMatter
    } else if is_question_heading(text) {
        HeadingTier::QuestionHeading
    } else if is_all_caps_heading(text, opts) {
        HeadingTier::AllCapsFallback
    } else {
        HeadingTier::None
    }
}

// ── Named tiers ──────────────────────────────────────────────────────────────

/// Optional section label: `2`, `2.1`, `IV` followed by `.`, `)` or `:`.
/// Roman numerals stay upper-case even though the terms match in any case.
const LABEL: &str = r"(?:(?:\d+(?:\.\d+)*|(?-i:[IVXLC]+))[.):]?\s+)?";

fn named(terms: &[&str]) -> Regex {
    let pattern = format!(r"(?i)^{LABEL}(?:{})\s*:?$", terms.join("|"));
    Regex::new(&pattern).unwrap()
}

const STRUCTURAL_TERMS: &[&str] = &[
    "abstract",
    "summary",
    "executive summary",
    "introduction",
    "background",
    "objectives?",
    "aims?",
    "purpose",
    "methods?",
    "methodology",
    "materials and methods",
    "patients and methods",
    "study design",
    "results",
    "findings",
    "discussion",
    "conclusions?",
    "results and discussion",
    "limitations",
    "recommendations",
    "overview",
    "highlights",
];

const CLINICAL_TERMS: &[&str] = &[
    "diagnosis",
    "differential diagnosis",
    "diagnostic (?:criteria|evaluation|workup)",
    "treatment",
    "treatment options",
    "management",
    "therapy",
    "prognosis",
    "outcomes?",
    "follow-up",
    "epidemiology",
    "a?etiology",
    "pathophysiology",
    "pathogenesis",
    "risk factors",
    "complications",
    "clinical (?:features|presentation|findings|manifestations|course)",
    "signs and symptoms",
    "symptoms",
    "physical examination",
    "history",
    "laboratory (?:findings|tests|studies)",
    "imaging",
    "investigations",
    "indications",
    "contraindications",
    "adverse effects",
    "dosage",
];

const PATIENT_ED_TERMS: &[&str] = &[
    "key points",
    "key messages",
    "patient education",
    "patient information",
    "what you need to know",
    "what to expect",
    "self-care",
    "home care",
    "prevention",
    "when to (?:see|call) (?:a|your) (?:doctor|healthcare provider)",
    "when to seek (?:medical )?(?:care|help)",
    "questions to ask your doctor",
    "living with .{1,40}",
];

const BACK_MATTER_TERMS: &[&str] = &[
    "references",
    "bibliography",
    "works cited",
    "literature cited",
    "acknowledge?ments?",
    "funding",
    "funding sources",
    "financial support",
    "conflicts? of interest",
    "competing interests?",
    "disclosures?",
    "author contributions",
    "declarations?",
    "ethics statement",
    "data availability(?: statement)?",
    "abbreviations",
    "supplementary (?:material|data|information)",
    "appendix",
];

static RE_STRUCTURAL: Lazy<Regex> = Lazy::new(|| named(STRUCTURAL_TERMS));
static RE_CLINICAL: Lazy<Regex> = Lazy::new(|| named(CLINICAL_TERMS));
static RE_PATIENT_ED: Lazy<Regex> = Lazy::new(|| named(PATIENT_ED_TERMS));
static RE_BACK_MATTER: Lazy<Regex> = Lazy::new(|| named(BACK_MATTER_TERMS));

static RE_CASE_REPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:case (?:reports?|presentation|description|summary|history)|case\s*(?:no\.?\s*|#\s*)?\d+)\s*[:.]?$",
    )
    .unwrap()
});

// ── Question tier ────────────────────────────────────────────────────────────

static RE_QUESTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:what|how|why|when|who|which|where|can|should|is|are|do|does|will)\b[^?]{2,}\?$",
    )
    .unwrap()
});

fn is_question_heading(text: &str) -> bool {
    RE_QUESTION.is_match(text) && text.split_whitespace().count() < 15
}

// ── All-caps fallback ────────────────────────────────────────────────────────

static RE_CAPS_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{Lu}0-9][\p{Lu}0-9 \-():]*\.?$").unwrap());

static RE_HAS_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Lu}").unwrap());

static RE_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)copyright|©|\bdoi\b|\bissn\b|\bisbn\b|\bvol(?:ume)?\b|\bpages?\b|\bpp\b|\bno\b\s*\d|https?:|www\b")
        .unwrap()
});

fn is_all_caps_heading(text: &str, opts: HeadingOptions) -> bool {
    let len = text.chars().count();
    if !(4..=80).contains(&len) {
        return false;
    }
    if !RE_CAPS_SHAPE.is_match(text) || !RE_HAS_LETTER.is_match(text) {
        return false;
    }
    if RE_NOISE.is_match(text) {
        return false;
    }
    if opts.strict_fallback {
        let words = text.split_whitespace().count();
        if words >= 12 || text.ends_with('.') {
            return false;
        }
    }
    true
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// `**TEXT**` or `__TEXT__` → `TEXT`; anything else unchanged.
fn strip_strong(text: &str) -> &str {
    for marker in ["**", "__"] {
        if let Some(inner) = text
            .strip_prefix(marker)
            .and_then(|rest| rest.strip_suffix(marker))
        {
            let inner = inner.trim();
            if !inner.is_empty() && !inner.contains(marker) {
                return inner;
            }
        }
    }
    text
}
