//! Orchestration for `stopgate precompact`.
//!
//! Before the host compacts its context, the conversation is handed to an
//! analyzer that lists work discussed but never filed. New findings become
//! tracker issues. Every failure is logged and skipped; compaction is never
//! held up.

use tracing::{debug, info, instrument, warn};

use crate::core::untracked::{NewIssue, select_new};
use crate::io::analyzer::IssueAnalyzer;
use crate::io::tracker::Tracker;

/// What one capture run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Issues the analyzer proposed.
    pub proposed: usize,
    /// Proposals dropped because an open issue already covers them.
    pub duplicates: usize,
    pub created: Vec<NewIssue>,
    /// Issues the tracker refused to create.
    pub failed: usize,
}

#[instrument(skip_all, fields(conversation_chars = conversation.len()))]
pub fn capture_untracked(
    conversation: &str,
    tracker: &Tracker<'_>,
    analyzer: &dyn IssueAnalyzer,
) -> CaptureOutcome {
    let mut outcome = CaptureOutcome::default();
    if conversation.trim().is_empty() {
        debug!("empty conversation, nothing to analyze");
        return outcome;
    }

    let existing = tracker.open_titles();
    let proposed = match analyzer.analyze(conversation, &existing) {
        Ok(issues) => issues,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "untracked-work analysis failed");
            return outcome;
        }
    };
    outcome.proposed = proposed.len();

    let (fresh, duplicates) = select_new(proposed, &existing);
    outcome.duplicates = duplicates;
    for issue in fresh {
        match tracker.create_issue(&issue) {
            Ok(()) => outcome.created.push(issue),
            Err(err) => {
                warn!(title = %issue.title, err = %err, "could not create issue");
                outcome.failed += 1;
            }
        }
    }
    info!(
        proposed = outcome.proposed,
        duplicates = outcome.duplicates,
        created = outcome.created.len(),
        "untracked work captured"
    );
    outcome
}
