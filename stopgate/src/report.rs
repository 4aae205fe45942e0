//! Guidance text written to stderr for each decision.
//!
//! Short messages are formatted inline; the long reports are minijinja
//! templates under `templates/`.

use std::sync::LazyLock;

use anyhow::{Error, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::commit_guard::{NO_VERIFY_ACK, OVERRIDE_ENV};
use crate::core::scanners::{ScanReport, format_size};
use crate::core::types::BuildStatus;
use crate::io::quality::{QualityReport, tail_lines};

/// Exact phrase the agent must emit to request human input.
pub const BYPASS_PHRASE: &str =
    "I have completed all work that I can and require human input to proceed.";

const CHANGES_TEMPLATE: &str = include_str!("templates/changes.md");
const WORK_REMAINS_TEMPLATE: &str = include_str!("templates/work_remains.md");
const COMPLETION_TEMPLATE: &str = include_str!("templates/completion.md");
const PRE_EXIT_TEMPLATE: &str = include_str!("templates/pre_exit.md");
const QUALITY_OUTPUT_TEMPLATE: &str = include_str!("templates/quality_output.md");

static REPORTS: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template("quality_output", QUALITY_OUTPUT_TEMPLATE)
        .expect("quality_output template should be valid");
    env.add_template("changes", CHANGES_TEMPLATE)
        .expect("changes template should be valid");
    env.add_template("work_remains", WORK_REMAINS_TEMPLATE)
        .expect("work_remains template should be valid");
    env.add_template("completion", COMPLETION_TEMPLATE)
        .expect("completion template should be valid");
    env.add_template("pre_exit", PRE_EXIT_TEMPLATE)
        .expect("pre_exit template should be valid");
    env
});

/// Quality gate result shaped for templates.
#[derive(Debug, Clone, Serialize)]
struct QualityContext<'a> {
    passed: bool,
    total: usize,
    lines: Vec<&'a str>,
}

impl<'a> QualityContext<'a> {
    fn new(report: &'a QualityReport, tail: usize) -> Self {
        let (total, lines) = tail_lines(&report.output, tail);
        Self {
            passed: report.passed,
            total,
            lines,
        }
    }
}

fn render(name: &str, ctx: minijinja::Value) -> Result<String> {
    let template = REPORTS.get_template(name)?;
    Ok(template.render(ctx)?.trim_end().to_string())
}

pub fn bypass_accepted() -> String {
    "Human input required acknowledged. Allowing stop.".to_string()
}

pub fn bypass_rejected(open: usize) -> String {
    format!(
        "# Exit Phrase Rejected\n\nThere are {open} open issue(s) remaining.\n\n\
         Please work on the remaining issues before exiting.\nRun `bd ready` to see available work."
    )
}

/// Inputs for the uncommitted-changes report.
pub struct ChangesReport<'a> {
    pub change_desc: String,
    pub quality: &'a QualityReport,
    pub scans: &'a ScanReport,
    pub untracked_files: &'a [String],
    pub large_file_threshold: u64,
    pub quality_tail_lines: usize,
    pub untracked_shown: usize,
}

pub fn changes(report: &ChangesReport<'_>) -> Result<String> {
    let shown = report.untracked_files.len().min(report.untracked_shown);
    render(
        "changes",
        context! {
            change_desc => report.change_desc,
            quality => QualityContext::new(report.quality, report.quality_tail_lines),
            suppressions => report.scans.suppressions.messages,
            empty_handlers => report.scans.empty_handlers.messages,
            secrets => report.scans.secrets.messages,
            untracked_work => report.scans.untracked_work.messages,
            large_files => report.scans.large_files.messages,
            large_file_limit => format_size(report.large_file_threshold),
            untracked_files => report.untracked_files[..shown],
            untracked_more => report.untracked_files.len() - shown,
        },
    )
}

/// Guidance when a gate that must fail closed hit an internal error.
pub fn gate_failed(gate: &str, err: &Error) -> String {
    format!(
        "# Stop Gate Error\n\nThe {gate} check failed: {err:#}\n\n\
         Stopping stays blocked until the check can run.\n\
         Fix the problem above, or run `stopgate session clear` to end the session."
    )
}

pub fn no_verify_rejected() -> String {
    format!(
        "ERROR: Attempting to use git commit with --no-verify.\n\n\
         The --no-verify flag skips pre-commit hooks, which are important for:\n\
         - Running quality checks before commits\n\
         - Preventing secrets from being committed\n\
         - Keeping tracker state in sync\n\n\
         If the user has explicitly said you can skip hooks, set:\n\n  \
         {OVERRIDE_ENV}=\"{NO_VERIFY_ACK}\""
    )
}

pub fn build_blocked(status: &BuildStatus) -> Option<String> {
    let message = status.message()?;
    let hint = match status {
        BuildStatus::Running(_) => "Waiting for builds to complete...\nRun `gh run list` to check status.",
        _ => "Fix the failing builds before stopping.\nRun `gh run view` to see details.",
    };
    Some(format!("# GitHub Actions Check\n\n{message}\n\n{hint}"))
}

pub fn question_allowed(reason: &str) -> String {
    format!(
        "# Allowing stop for user interaction\n\nReason: {reason}\n\n\
         The agent appears to be asking a question and you were active.\n\
         Please respond to continue the conversation."
    )
}

pub fn injected_answer(answer: &str) -> String {
    format!("# Sub-agent Response\n\n{answer}\n\n---\nContinuing autonomous work...")
}

pub fn staleness(since_change: u32) -> String {
    format!(
        "# Staleness Detected\n\nNo issue changes for {since_change} iterations.\n\
         Autonomous mode is stopping due to lack of progress.\n\n\
         This could mean:\n\
         - The remaining work requires human decisions\n\
         - There's a blocker that needs manual intervention\n\
         - The loop is stuck in an unproductive pattern\n\n\
         Run `/autonomous-mode` to start a new session with fresh goals."
    )
}

pub fn completion(quality: &QualityReport, tail: usize) -> Result<String> {
    render(
        "completion",
        context! {
            quality => QualityContext::new(quality, tail),
            bypass_phrase => BYPASS_PHRASE,
        },
    )
}

/// Inputs for the work-remains report.
pub struct WorkRemains {
    pub iteration: u32,
    pub since_change: u32,
    pub open: usize,
    pub in_progress: usize,
    pub outstanding: usize,
    pub warn: bool,
    pub threshold: u32,
}

pub fn work_remains(input: &WorkRemains) -> Result<String> {
    render(
        "work_remains",
        context! {
            iteration => input.iteration,
            since_change => input.since_change,
            open => input.open,
            in_progress => input.in_progress,
            outstanding => input.outstanding,
            warn => input.warn,
            threshold => input.threshold,
            bypass_phrase => BYPASS_PHRASE,
        },
    )
}

pub fn pre_exit(quality: &QualityReport, tail: usize) -> Result<String> {
    render("pre_exit", context! { quality => QualityContext::new(quality, tail) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CheckOutcome;

    #[test]
    fn every_template_renders() {
        let passed = QualityReport::passed("");
        assert!(completion(&passed, 50).expect("completion").contains(BYPASS_PHRASE));
        assert!(pre_exit(&passed, 50)
            .expect("pre_exit")
            .ends_with("Quality gates passed. Allowing exit."));
    }

    #[test]
    fn changes_report_lists_sections_in_order() {
        let scans = ScanReport {
            secrets: CheckOutcome::new(true, vec!["a.py:1: GitHub token".into()]),
            suppressions: CheckOutcome::new(true, vec!["a.py:2: noqa comment".into()]),
            ..ScanReport::default()
        };
        let untracked: Vec<String> = (0..12).map(|n| format!("f{n}.txt")).collect();
        let quality = QualityReport::failed("line one\nline two\n");
        let text = changes(&ChangesReport {
            change_desc: "unstaged changes, untracked files".into(),
            quality: &quality,
            scans: &scans,
            untracked_files: &untracked,
            large_file_threshold: 512_000,
            quality_tail_lines: 50,
            untracked_shown: 10,
        })
        .expect("render");

        assert!(text.starts_with("# Uncommitted Changes Detected\n\nCannot exit with unstaged changes, untracked files."));
        let quality_at = text.find("## Quality Checks Failed").expect("quality");
        let suppress_at = text.find("## Error Suppression Detected").expect("suppression");
        let secrets_at = text.find("## SECURITY: Hardcoded Secrets Detected").expect("secrets");
        assert!(quality_at < suppress_at && suppress_at < secrets_at);
        assert!(text.contains("  line two\n"));
        assert!(text.contains("  a.py:1: GitHub token\n"));
        assert!(text.contains("  f9.txt\n  ... and 2 more\n"));
        assert!(!text.contains("f10.txt"));
        assert!(!text.contains("## Empty Exception Handlers"));
        assert!(text.ends_with("Work is incomplete until `git push` succeeds."));
    }

    #[test]
    fn long_quality_output_is_tailed() {
        let output = (1..=80).map(|n| format!("l{n}")).collect::<Vec<_>>().join("\n");
        let text = pre_exit(&QualityReport::failed(output), 50).expect("render");
        assert!(text.contains("... (showing last 50 of 80 lines)"));
        assert!(text.contains("  l31\n"));
        assert!(!text.contains("  l30\n"));
    }

    #[test]
    fn work_remains_warns_after_threshold() {
        let mut input = WorkRemains {
            iteration: 4,
            since_change: 3,
            open: 2,
            in_progress: 1,
            outstanding: 3,
            warn: true,
            threshold: 5,
        };
        let text = work_remains(&input).expect("render");
        assert!(text.contains("**Iteration 4** | Outstanding issues: 3"));
        assert!(text.contains("**Warning**: No issue changes for 3 loops."));
        assert!(text.ends_with(&format!("\"{BYPASS_PHRASE}\"")));
        input.warn = false;
        assert!(!work_remains(&input).expect("render").contains("**Warning**"));
    }

    #[test]
    fn build_guidance_depends_on_status() {
        assert_eq!(build_blocked(&BuildStatus::Clear), None);
        let running = build_blocked(&BuildStatus::Running(vec!["ci".into()])).expect("running");
        assert!(running.contains("GitHub Actions running: ci"));
        assert!(running.contains("gh run list"));
        let failed = build_blocked(&BuildStatus::Failed(vec!["ci".into()])).expect("failed");
        assert!(failed.contains("gh run view"));
    }
}
