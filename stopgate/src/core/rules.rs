//! Declarative content rules evaluated by one generic matcher.
//!
//! Each rule is a `{pattern, classification, blocking}` entry. Scanners select
//! rules by [`Classification`] and report the first rule matching a line.

use std::sync::LazyLock;

use regex::Regex;

/// What kind of problem a rule detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Hardcoded credential tokens.
    Secret,
    /// Type-checker or linter suppression directives.
    Suppression,
    /// Exception handlers with no recovery logic.
    EmptyHandler,
    /// Work markers in comments with no issue reference.
    UntrackedWork,
}

/// One entry of the rule table.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub classification: Classification,
    pub pattern: &'static str,
    /// Rule does not fire when this matches the text after the main match.
    pub unless_after: Option<&'static str>,
    /// Lines from files whose path contains this fragment are skipped.
    pub exempt_path: Option<&'static str>,
    /// `{marker}` is replaced with the upper-cased `marker` capture.
    pub description: &'static str,
    pub blocking: bool,
}

const CREDENTIALS_DIR: &str = ".credentials";
const ISSUE_REFERENCE: &str = r"#[a-zA-Z]+-[a-zA-Z0-9]+";

pub const RULES: &[Rule] = &[
    // Credential token shapes.
    secret(r"gh[spo]_[A-Za-z0-9]{36,}", "GitHub token"),
    secret(r"ghu_[A-Za-z0-9]{36,}", "GitHub user token"),
    secret(r"ghr_[A-Za-z0-9]{36,}", "GitHub refresh token"),
    secret(r"github_pat_[A-Za-z0-9_]{22,}", "GitHub fine-grained PAT"),
    secret(r"AKIA[0-9A-Z]{16}", "AWS access key"),
    // Suppression directives.
    suppression(r"#\s*type:\s*ignore", "type: ignore comment"),
    suppression(r"#\s*noqa", "noqa comment"),
    suppression(r"#\s*pylint:\s*disable", "pylint disable comment"),
    suppression(r"//\s*@ts-ignore", "TypeScript @ts-ignore comment"),
    suppression(r"//\s*@ts-expect-error", "TypeScript @ts-expect-error comment"),
    suppression(r"(?:/\*|//)\s*eslint-disable", "ESLint disable comment"),
    // Handlers that swallow errors.
    empty_handler(r"\bexcept\b.*:\s*(?:pass|\.\.\.)\s*$", "empty except block"),
    empty_handler(r"^\s*except(?:\s+Exception)?\s*:\s*$", "bare except clause"),
    empty_handler(r"\bcatch\s*(?:\([^)]*\))?\s*\{\s*\}", "empty catch block"),
    // Work markers.
    Rule {
        classification: Classification::UntrackedWork,
        pattern: r"(?i)(?:#|//)\s*(?P<marker>TODO|FIXME|HACK|XXX)\b",
        unless_after: Some(ISSUE_REFERENCE),
        exempt_path: None,
        description: "{marker} without issue reference",
        blocking: false,
    },
];

const fn secret(pattern: &'static str, description: &'static str) -> Rule {
    Rule {
        classification: Classification::Secret,
        pattern,
        unless_after: None,
        exempt_path: Some(CREDENTIALS_DIR),
        description,
        blocking: true,
    }
}

const fn suppression(pattern: &'static str, description: &'static str) -> Rule {
    Rule {
        classification: Classification::Suppression,
        pattern,
        unless_after: None,
        exempt_path: None,
        description,
        blocking: true,
    }
}

const fn empty_handler(pattern: &'static str, description: &'static str) -> Rule {
    Rule {
        classification: Classification::EmptyHandler,
        pattern,
        unless_after: None,
        exempt_path: None,
        description,
        blocking: true,
    }
}

/// A rule with its patterns compiled.
#[derive(Debug)]
pub struct CompiledRule {
    pub rule: &'static Rule,
    pattern: Regex,
    unless_after: Option<Regex>,
}

impl CompiledRule {
    fn compile(rule: &'static Rule) -> Self {
        Self {
            rule,
            pattern: Regex::new(rule.pattern).unwrap(),
            unless_after: rule
                .unless_after
                .map(|p| Regex::new(&format!("(?i){p}")).unwrap()),
        }
    }

    /// Evaluate the rule against one line, returning the rendered description on a hit.
    pub fn evaluate(&self, file: &str, content: &str) -> Option<String> {
        if let Some(fragment) = self.rule.exempt_path
            && file.contains(fragment)
        {
            return None;
        }
        let caps = self.pattern.captures_iter(content).find(|caps| {
            let Some(whole) = caps.get(0) else {
                return false;
            };
            self.unless_after
                .as_ref()
                .is_none_or(|unless| !unless.is_match(&content[whole.end()..]))
        })?;
        let marker = caps
            .name("marker")
            .map(|m| m.as_str().to_uppercase())
            .unwrap_or_default();
        Some(self.rule.description.replace("{marker}", &marker))
    }
}

static COMPILED: LazyLock<Vec<CompiledRule>> =
    LazyLock::new(|| RULES.iter().map(CompiledRule::compile).collect());

/// Compiled rules for one classification, in table order.
pub fn rules_for(classification: Classification) -> impl Iterator<Item = &'static CompiledRule> {
    COMPILED
        .iter()
        .filter(move |compiled| compiled.rule.classification == classification)
}

/// First rule of `classification` that fires on the line, as `(rule, description)`.
pub fn first_match(
    classification: Classification,
    file: &str,
    content: &str,
) -> Option<(&'static Rule, String)> {
    rules_for(classification)
        .find_map(|compiled| compiled.evaluate(file, content).map(|d| (compiled.rule, d)))
}
