//! Untracked-work capture before context compaction.
//!
//! The analyzer replies with one `ISSUE|<type>|<priority>|<title>` line per
//! finding, or `NONE`. Parsing is strict about the fields and lenient about
//! everything around them; candidates whose titles overlap an open issue are
//! dropped.

use std::fmt;

/// Longest title passed to the tracker, in characters.
pub const MAX_TITLE_CHARS: usize = 80;

/// Lowest-urgency priority the tracker accepts (0 is critical).
pub const MAX_PRIORITY: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Bug,
    Feature,
    Task,
}

impl IssueKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bug" => Some(Self::Bug),
            "feature" => Some(Self::Feature),
            "task" => Some(Self::Task),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issue proposed by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub kind: IssueKind,
    pub priority: u8,
    pub title: String,
}

/// Parse analyzer output. Reading stops at a `NONE` line.
pub fn parse_analysis(output: &str) -> Vec<NewIssue> {
    let mut issues = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line == "NONE" {
            break;
        }
        if let Some(issue) = parse_issue_line(line) {
            issues.push(issue);
        }
    }
    issues
}

fn parse_issue_line(line: &str) -> Option<NewIssue> {
    let rest = line.strip_prefix("ISSUE|")?;
    let mut fields = rest.splitn(3, '|');
    let kind = IssueKind::parse(fields.next()?)?;
    let priority = fields.next()?;
    if priority.is_empty() || !priority.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let priority: u8 = priority.parse().ok().filter(|p| *p <= MAX_PRIORITY)?;
    let title: String = fields.next()?.trim().chars().take(MAX_TITLE_CHARS).collect();
    let title = title.trim_end().to_string();
    if title.is_empty() {
        return None;
    }
    Some(NewIssue {
        kind,
        priority,
        title,
    })
}

/// True if either title contains the other, ignoring case.
pub fn is_duplicate(title: &str, existing: &[String]) -> bool {
    let title = title.to_lowercase();
    existing.iter().any(|other| {
        let other = other.trim().to_lowercase();
        !other.is_empty() && (other.contains(&title) || title.contains(&other))
    })
}

/// Candidates worth creating, plus the number dropped as duplicates.
///
/// Accepted titles join the comparison set, so the analyzer repeating itself
/// creates one issue.
pub fn select_new(candidates: Vec<NewIssue>, existing: &[String]) -> (Vec<NewIssue>, usize) {
    let mut seen = existing.to_vec();
    let mut accepted = Vec::new();
    let mut skipped = 0;
    for issue in candidates {
        if is_duplicate(&issue.title, &seen) {
            skipped += 1;
            continue;
        }
        seen.push(issue.title.clone());
        accepted.push(issue);
    }
    (accepted, skipped)
}
