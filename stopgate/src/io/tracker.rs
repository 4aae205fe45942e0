//! Issue tracker (`bd`) adapter.
//!
//! Structured output (`--json`) is preferred. Older tracker builds print one
//! issue per line; those are parsed with the [`IssueId`] schema.
//!
//! Besides listing ids for the gate, the tracker supplies open titles and
//! creates the issues captured before compaction.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::core::issue_id::IssueId;
use crate::core::types::IssueCounts;
use crate::core::untracked::NewIssue;
use crate::io::process::{CommandRunner, CommandSpec};

#[derive(Debug, Deserialize)]
struct TrackerIssue {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
}

pub struct Tracker<'a> {
    runner: &'a dyn CommandRunner,
    program: &'a str,
    timeout: Duration,
}

impl<'a> Tracker<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: &'a str, timeout: Duration) -> Self {
        Self {
            runner,
            program,
            timeout,
        }
    }

    /// Open and in-progress ids. A failing tracker yields empty sets.
    #[instrument(skip_all)]
    pub fn issue_counts(&self) -> IssueCounts {
        IssueCounts {
            open: self.ids_with_status("open"),
            in_progress: self.ids_with_status("in_progress"),
        }
    }

    fn ids_with_status(&self, status: &str) -> BTreeSet<IssueId> {
        match self.list(status) {
            Ok(ids) => {
                debug!(status, count = ids.len(), "tracker issues");
                ids
            }
            Err(err) => {
                warn!(status, err = %err, "issue tracker unavailable");
                BTreeSet::new()
            }
        }
    }

    /// Titles of open issues. A failing tracker yields none.
    #[instrument(skip_all)]
    pub fn open_titles(&self) -> Vec<String> {
        match self.list_raw("open") {
            Ok(output) => parse_issue_titles(&output),
            Err(err) => {
                warn!(err = %err, "issue tracker unavailable");
                Vec::new()
            }
        }
    }

    #[instrument(skip_all, fields(kind = %issue.kind, priority = issue.priority))]
    pub fn create_issue(&self, issue: &NewIssue) -> Result<()> {
        let spec = CommandSpec::new(
            self.program,
            [
                "create".to_string(),
                format!("--title={}", issue.title),
                format!("--type={}", issue.kind),
                format!("--priority={}", issue.priority),
            ],
        )
        .with_timeout(self.timeout);
        let output = self.runner.run(&spec)?;
        if !output.success() {
            return Err(anyhow!(
                "{} create exited with {:?}: {}",
                self.program,
                output.exit_code,
                output.combined_text().trim()
            ));
        }
        debug!(title = %issue.title, "issue created");
        Ok(())
    }

    fn list(&self, status: &str) -> Result<BTreeSet<IssueId>> {
        Ok(parse_issue_list(&self.list_raw(status)?))
    }

    fn list_raw(&self, status: &str) -> Result<String> {
        let spec = CommandSpec::new(
            self.program,
            ["list".to_string(), format!("--status={status}"), "--json".to_string()],
        )
        .with_timeout(self.timeout);
        let output = self.runner.run(&spec)?;
        if !output.success() {
            return Err(anyhow!(
                "{} list exited with {:?}",
                self.program,
                output.exit_code
            ));
        }
        Ok(output.stdout_text())
    }
}

/// Parse tracker output: a JSON array of `{"id": ...}` objects, or plain text.
pub fn parse_issue_list(output: &str) -> BTreeSet<IssueId> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return BTreeSet::new();
    }
    if let Ok(issues) = serde_json::from_str::<Vec<TrackerIssue>>(trimmed) {
        return issues.into_iter().filter_map(|i| IssueId::new(i.id)).collect();
    }
    parse_issue_text(trimmed)
}

/// Issue titles from JSON objects, or from the text after ` - ` on each line.
pub fn parse_issue_titles(output: &str) -> Vec<String> {
    let trimmed = output.trim();
    if let Ok(issues) = serde_json::from_str::<Vec<TrackerIssue>>(trimmed) {
        return issues
            .into_iter()
            .map(|i| i.title.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }
    trimmed
        .lines()
        .filter_map(|line| line.split_once(" - "))
        .map(|(_, title)| title.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// One issue per line; the first token matching the id schema is taken.
fn parse_issue_text(output: &str) -> BTreeSet<IssueId> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().find_map(IssueId::from_token))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::untracked::IssueKind;
    use crate::test_support::{ScriptedRunner, ids};

    #[test]
    fn parses_json_ids() {
        let json = r#"[{"id":"proj-a1","title":"x"},{"id":"proj-b2.1","status":"open"}]"#;
        assert_eq!(parse_issue_list(json), ids(&["proj-a1", "proj-b2.1"]));
    }

    #[test]
    fn parses_text_lines_after_status_glyph() {
        let text = "○ proj-3f2 [P1] Fix the parser\n● [proj-9] follow-up work\nNo more issues\n";
        assert_eq!(parse_issue_list(text), ids(&["proj-3f2", "proj-9"]));
    }

    #[test]
    fn text_without_ids_is_empty() {
        assert!(parse_issue_list("Found 0 issues\nfollow-up later\n").is_empty());
        assert!(parse_issue_list("[]").is_empty());
        assert!(parse_issue_list("").is_empty());
    }

    #[test]
    fn failing_tracker_yields_empty_sets() {
        let runner = ScriptedRunner::new()
            .fail("bd list --status=open --json", 1, "no database")
            .ok("bd list --status=in_progress --json", r#"[{"id":"p-1"}]"#);
        let tracker = Tracker::new(&runner, "bd", Duration::from_secs(1));
        let counts = tracker.issue_counts();
        assert!(counts.open.is_empty());
        assert_eq!(counts.in_progress, ids(&["p-1"]));
    }

    #[test]
    fn missing_tracker_binary_yields_empty_sets() {
        let runner = ScriptedRunner::new();
        let tracker = Tracker::new(&runner, "bd", Duration::from_secs(1));
        assert_eq!(tracker.issue_counts(), IssueCounts::default());
    }

    #[test]
    fn titles_from_json_and_text() {
        let json = r#"[{"id":"p-1","title":"Fix the parser"},{"id":"p-2","title":" "}]"#;
        assert_eq!(parse_issue_titles(json), vec!["Fix the parser"]);
        let text = "○ p-123 [P2] [bug] - Issue title here\nFound 1 issue\n";
        assert_eq!(parse_issue_titles(text), vec!["Issue title here"]);
    }

    #[test]
    fn open_titles_fail_open() {
        let runner = ScriptedRunner::new().fail("bd list --status=open --json", 1, "no db");
        let tracker = Tracker::new(&runner, "bd", Duration::from_secs(1));
        assert!(tracker.open_titles().is_empty());
    }

    #[test]
    fn create_issue_passes_fields_as_flags() {
        let runner = ScriptedRunner::new()
            .ok("bd create --title=Add dark mode --type=feature --priority=3", "Created p-7\n")
            .fail("bd create --title=Broken --type=bug --priority=0", 1, "db locked");
        let tracker = Tracker::new(&runner, "bd", Duration::from_secs(1));
        let feature = NewIssue {
            kind: IssueKind::Feature,
            priority: 3,
            title: "Add dark mode".to_string(),
        };
        tracker.create_issue(&feature).expect("created");

        let bug = NewIssue {
            kind: IssueKind::Bug,
            priority: 0,
            title: "Broken".to_string(),
        };
        let err = tracker.create_issue(&bug).unwrap_err();
        assert!(err.to_string().contains("db locked"));
    }
}
