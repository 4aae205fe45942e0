//! Shared deterministic types for gate evaluation.
//!
//! These types define stable contracts between core components and the I/O
//! layer. They must not depend on external state.

use std::collections::BTreeSet;

use crate::core::issue_id::IssueId;
use crate::exit_codes;

/// A line introduced by a diff (never persisted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedLine {
    pub file: String,
    /// 1-indexed line number in the new version of `file`.
    pub line: u32,
    pub content: String,
}

/// Result of one scanner pass over the added lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub blocking: bool,
    pub messages: Vec<String>,
}

impl CheckOutcome {
    pub fn new(blocking: bool, messages: Vec<String>) -> Self {
        Self { blocking, messages }
    }

    /// True when this outcome found something that must block the stop.
    pub fn blocks(&self) -> bool {
        self.blocking && !self.messages.is_empty()
    }
}

/// Persisted progress of one autonomous session.
///
/// Invariant: `last_issue_change_iteration <= iteration`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub iteration: u32,
    pub last_issue_change_iteration: u32,
    pub issue_snapshot: BTreeSet<IssueId>,
}

/// Which kinds of uncommitted work exist in the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub unstaged: bool,
    pub staged: bool,
    pub untracked: bool,
}

impl Changes {
    pub fn has_changes(&self) -> bool {
        self.unstaged || self.staged || self.untracked
    }

    /// Human-readable list of the categories present, e.g. `unstaged changes, untracked files`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.unstaged {
            parts.push("unstaged changes");
        }
        if self.staged {
            parts.push("staged changes");
        }
        if self.untracked {
            parts.push("untracked files");
        }
        parts.join(", ")
    }
}

/// Open and in-progress issue ids from the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueCounts {
    pub open: BTreeSet<IssueId>,
    pub in_progress: BTreeSet<IssueId>,
}

impl IssueCounts {
    /// Every outstanding id (`open ∪ in_progress`).
    pub fn snapshot(&self) -> BTreeSet<IssueId> {
        self.open.union(&self.in_progress).cloned().collect()
    }
}

/// CI status for the current commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BuildStatus {
    /// Nothing failing or running, or no signal available.
    #[default]
    Clear,
    /// Names of runs that reached a failure conclusion.
    Failed(Vec<String>),
    /// Names of runs still pending, queued or running.
    Running(Vec<String>),
}

impl BuildStatus {
    pub fn should_block(&self) -> bool {
        !matches!(self, BuildStatus::Clear)
    }

    pub fn message(&self) -> Option<String> {
        match self {
            BuildStatus::Clear => None,
            BuildStatus::Failed(names) => {
                Some(format!("GitHub Actions failed: {}", names.join(", ")))
            }
            BuildStatus::Running(names) => {
                Some(format!("GitHub Actions running: {}", names.join(", ")))
            }
        }
    }
}

/// Final outcome of a stop attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block,
}

/// Verdict plus the guidance lines written to stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    pub messages: Vec<String>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            verdict: Verdict::Allow,
            messages: Vec::new(),
        }
    }

    pub fn block() -> Self {
        Self {
            verdict: Verdict::Block,
            messages: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn is_allow(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    pub fn exit_code(&self) -> i32 {
        match self.verdict {
            Verdict::Allow => exit_codes::ALLOW,
            Verdict::Block => exit_codes::BLOCK,
        }
    }

    /// All guidance joined into one block of text.
    pub fn text(&self) -> String {
        self.messages.join("\n")
    }
}
