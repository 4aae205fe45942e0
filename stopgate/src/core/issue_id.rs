//! Issue identifiers reported by the tracker.
//!
//! An id is `prefix-suffix`: the prefix starts with an ASCII letter and may
//! contain letters, digits, `_` and inner hyphens; the suffix is alphanumeric
//! and may carry `.N` child segments (`proj-a1b2.3`). Only equality matters.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static ISSUE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(?:-[A-Za-z0-9_]+)*-(?P<suffix>[A-Za-z0-9]+(?:\.[0-9]+)*)$")
        .unwrap()
});

/// Opaque identifier of a tracked unit of work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IssueId(String);

impl IssueId {
    /// Accept an id from structured tracker output as-is.
    ///
    /// Returns `None` for empty values or values containing whitespace.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Recognize an id inside free-form tracker text.
    ///
    /// Surrounding punctuation (`[`, `]`, `(`, `)`, `:`, `,`) is stripped and
    /// the suffix must contain a digit, so words like `follow-up` are rejected.
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim_matches(|c| matches!(c, '[' | ']' | '(' | ')' | ':' | ','));
        let caps = ISSUE_ID_RE.captures(token)?;
        let suffix = caps.name("suffix")?.as_str();
        if !suffix.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_accepts_tracker_ids() {
        for token in ["proj-123", "bd-a1b2", "my-app-7f3", "proj-a1b2.3", "[proj-9]"] {
            assert!(IssueId::from_token(token).is_some(), "expected id: {token}");
        }
    }

    #[test]
    fn token_rejects_prose() {
        for token in ["follow-up", "-123", "123-abc", "proj-", "P2", "○"] {
            assert!(IssueId::from_token(token).is_none(), "unexpected id: {token}");
        }
    }

    #[test]
    fn token_strips_brackets() {
        let id = IssueId::from_token("(proj-42):").expect("id");
        assert_eq!(id.as_str(), "proj-42");
    }

    #[test]
    fn new_rejects_blank_and_whitespace() {
        assert!(IssueId::new("").is_none());
        assert!(IssueId::new("a b").is_none());
        assert_eq!(IssueId::new(" x-1 ").expect("id").as_str(), "x-1");
    }
}
