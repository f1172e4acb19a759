//! User-supplied substitution rules applied after heading annotation.
//!
//! Rules live in a YAML file (`config_regex.yaml` by default):
//!
//! ```yaml
//! rules:
//!   - name: Convert dates to headers
//!     description: Add ### before dates for timeline generation
//!     find: (\d{1,2}/\d{1,2}/\d{4})
//!     replace: '### \1'
//! ```
//!
//! Each rule is a global regex substitution over the whole document, applied
//! in file order, each rule seeing the previous rule's output. A rule with an
//! empty `find` or a pattern that does not compile is reported and skipped;
//! the remaining rules still apply.

use crate::error::PipelineError;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// One find/replace record from the rule configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "unnamed")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub find: String,
    #[serde(default)]
    pub replace: String,
}

fn unnamed() -> String {
    "Unnamed rule".to_string()
}

impl Rule {
    pub fn new(name: impl Into<String>, find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            find: find.into(),
            replace: replace.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// On-disk shape of the rule configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleConfig {
    /// The configuration written when none exists.
    pub fn default_config() -> Self {
        Self {
            rules: vec![Rule::new(
                "Convert dates to headers",
                r"(\d{1,2}/\d{1,2}/\d{4})",
                r"### \1",
            )
            .with_description("Add ### before dates for NotebookLM timeline generation")],
        }
    }
}

/// Load rules from `path`, creating the default configuration if the file is absent.
pub fn load_rules(path: &Path) -> Result<Vec<Rule>, PipelineError> {
    if !path.exists() {
        warn!("Rule config not found: {}", path.display());
        create_default_config(path)?;
        info!("Created default rule config: {}", path.display());
    }

    let text = std::fs::read_to_string(path).map_err(|e| PipelineError::RuleConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let config: RuleConfig =
        serde_yaml::from_str(&text).map_err(|e| PipelineError::RuleConfigParse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    Ok(config.rules)
}

/// Write [`RuleConfig::default_config`] to `path`.
pub fn create_default_config(path: &Path) -> Result<(), PipelineError> {
    let yaml = serde_yaml::to_string(&RuleConfig::default_config()).map_err(|e| {
        PipelineError::RuleConfigCreate {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::RuleConfigCreate {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    }
    std::fs::write(path, yaml).map_err(|e| PipelineError::RuleConfigCreate {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

// ── Engine ───────────────────────────────────────────────────────────────────

struct CompiledRule {
    name: String,
    pattern: Regex,
    replacement: String,
}

/// A rule list compiled once and applied to many documents.
///
/// Immutable after construction, so a single `Arc<RuleEngine>` is shared by
/// every cleanup worker.
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
    skipped: Vec<String>,
}

impl RuleEngine {
    /// Compile `rules` in order, dropping inert and malformed ones.
    pub fn new(rules: &[Rule]) -> Self {
        let mut compiled = Vec::with_capacity(rules.len());
        let mut skipped = Vec::new();

        for rule in rules {
            if rule.find.is_empty() {
                warn!("Skipping rule '{}': no 'find' pattern", rule.name);
                skipped.push(rule.name.clone());
                continue;
            }
            match Regex::new(&rule.find) {
                Ok(pattern) => compiled.push(CompiledRule {
                    name: rule.name.clone(),
                    pattern,
                    replacement: translate_replacement(&rule.replace),
                }),
                Err(e) => {
                    warn!("Skipping rule '{}': invalid pattern: {}", rule.name, e);
                    skipped.push(rule.name.clone());
                }
            }
        }

        Self {
            rules: compiled,
            skipped,
        }
    }

    /// An engine with no rules; `apply` returns its input unchanged.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Apply every active rule in order.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            let replaced = rule.pattern.replace_all(&out, rule.replacement.as_str());
            if let std::borrow::Cow::Owned(s) = replaced {
                tracing::trace!("Rule '{}' changed the document", rule.name);
                out = s;
            }
        }
        out
    }

    /// Number of rules that will be applied.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Names of rules dropped at compile time.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field(
                "rules",
                &self.rules.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            )
            .field("skipped", &self.skipped)
            .finish()
    }
}

/// Apply `rules` to `text` in order. Convenience over [`RuleEngine`].
pub fn apply_rules(text: &str, rules: &[Rule]) -> String {
    RuleEngine::new(rules).apply(text)
}

// ── Replacement syntax ───────────────────────────────────────────────────────
//
// Rule files use `\1` and `\g<name>` back-references. The regex crate expects
// `${1}` and `${name}`, and treats a bare `$` as the start of a reference.
// Escapes such as `\n` and `\t` in a replacement become the control character.

static RE_BACKREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$|\\(\d{1,2})|\\g<(\w+)>|\\([ntrfva])|\\\\").unwrap());

fn translate_replacement(replace: &str) -> String {
    RE_BACKREF
        .replace_all(replace, |caps: &Captures<'_>| {
            if let Some(n) = caps.get(1) {
                format!("${{{}}}", n.as_str())
            } else if let Some(name) = caps.get(2) {
                format!("${{{}}}", name.as_str())
            } else if let Some(esc) = caps.get(3) {
                control_char(esc.as_str()).to_string()
            } else if &caps[0] == "$" {
                "$$".to_string()
            } else {
                "\\".to_string()
            }
        })
        .into_owned()
}

fn control_char(letter: &str) -> &'static str {
    match letter {
        "n" => "\n",
        "t" => "\t",
        "r" => "\r",
        "f" => "\x0c",
        "v" => "\x0b",
        _ => "\x07",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_date_rule_promotes_dates() {
        let rules = RuleConfig::default_config().rules;
        let out = apply_rules("Seen on 3/14/2021 in clinic", &rules);
        assert_eq!(out, "Seen on ### 3/14/2021 in clinic");
    }

    #[test]
    fn rules_apply_in_caller_order() {
        let r1 = Rule::new("a to b", "a", "b");
        let r2 = Rule::new("b to c", "b", "c");
        let text = "aab";

        let forward = apply_rules(text, &[r1.clone(), r2.clone()]);
        let composed = apply_rules(&apply_rules(text, &[r1.clone()]), &[r2.clone()]);
        assert_eq!(forward, composed);
        assert_eq!(forward, "ccc");

        let reversed = apply_rules(text, &[r2, r1]);
        assert_eq!(reversed, "bbc");
        assert_ne!(forward, reversed);
    }

    #[test]
    fn malformed_rule_is_skipped_without_affecting_others() {
        let valid = vec![
            Rule::new("strip tabs", r"\t", " "),
            Rule::new("squash spaces", r" {2,}", " "),
        ];
        let mut with_bad = valid.clone();
        with_bad.insert(1, Rule::new("broken", r"(unclosed", "x"));

        let text = "alpha\t\tbeta   gamma";
        assert_eq!(apply_rules(text, &with_bad), apply_rules(text, &valid));

        let engine = RuleEngine::new(&with_bad);
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.skipped(), ["broken".to_string()]);
    }

    #[test]
    fn malformed_rule_alone_is_identity() {
        let text = "nothing changes";
        assert_eq!(apply_rules(text, &[Rule::new("bad", "[", "")]), text);
        assert_eq!(apply_rules(text, &[]), text);
    }

    #[test]
    fn empty_find_is_inert() {
        let engine = RuleEngine::new(&[Rule::new("empty", "", "X")]);
        assert!(engine.is_empty());
        assert_eq!(engine.apply("abc"), "abc");
    }

    #[test]
    fn translates_backreference_syntax() {
        assert_eq!(translate_replacement(r"### \1"), "### ${1}");
        assert_eq!(translate_replacement(r"\g<year>-\2"), "${year}-${2}");
        assert_eq!(translate_replacement("cost: $5"), "cost: $$5");
        assert_eq!(translate_replacement(r"a\\b"), r"a\b");
    }

    #[test]
    fn replacement_escapes_become_control_characters() {
        assert_eq!(translate_replacement(r"a\nb\tc"), "a\nb\tc");
        assert_eq!(translate_replacement(r"\\n"), r"\n");
        let rule = Rule::new("break", "X", r"\n## X");
        assert_eq!(apply_rules("a X b", &[rule]), "a \n## X b");
    }

    #[test]
    fn named_group_replacement() {
        let rule = Rule::new("swap", r"(?P<a>\w+)-(?P<b>\w+)", r"\g<b>-\g<a>");
        assert_eq!(apply_rules("left-right", &[rule]), "right-left");
    }

    #[test]
    fn dollar_in_replacement_is_literal() {
        let rule = Rule::new("price", "USD", "$");
        assert_eq!(apply_rules("10 USD", &[rule]), "10 $");
    }

    #[test]
    fn load_creates_default_config_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config_regex.yaml");

        let rules = load_rules(&path).unwrap();
        assert!(path.exists());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "Convert dates to headers");

        // Reloading reads back the same rule.
        assert_eq!(load_rules(&path).unwrap(), rules);
    }

    #[test]
    fn load_preserves_file_order_and_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(
            &path,
            "rules:\n  - name: first\n    find: x\n    replace: y\n  - find: y\n    replace: z\n",
        )
        .unwrap();

        let rules = load_rules(&path).unwrap();
        assert_eq!(rules[0].name, "first");
        assert_eq!(rules[1].name, "Unnamed rule");
        assert_eq!(rules[1].description, "");
        assert_eq!(apply_rules("x", &rules), "z");
    }

    #[test]
    fn load_rejects_malformed_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "rules: [ {name: ").unwrap();
        let err = load_rules(&path).unwrap_err();
        assert!(matches!(err, PipelineError::RuleConfigParse { .. }));
    }
}
