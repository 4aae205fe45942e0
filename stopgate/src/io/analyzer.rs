//! Untracked-work analyzer behind `stopgate precompact`.
//!
//! [`IssueAnalyzer`] hides the backend (a headless agent CLI call) from the
//! capture flow so tests can script the reply.

use std::time::Duration;

use anyhow::{Result, anyhow};
use minijinja::{Environment, context};
use tracing::{debug, instrument};

use crate::core::untracked::{MAX_TITLE_CHARS, NewIssue, parse_analysis};
use crate::io::process::{CommandRunner, CommandSpec};

const UNTRACKED_TEMPLATE: &str = include_str!("prompts/untracked.md");

pub trait IssueAnalyzer {
    /// Issues discussed in `conversation` that `existing` does not cover.
    fn analyze(&self, conversation: &str, existing: &[String]) -> Result<Vec<NewIssue>>;
}

pub fn render_untracked_prompt(conversation: &str, existing: &[String]) -> Result<String> {
    let mut existing: Vec<String> = existing.iter().map(|t| t.to_lowercase()).collect();
    existing.sort();
    existing.dedup();
    let env = Environment::new();
    let rendered = env.render_str(
        UNTRACKED_TEMPLATE,
        context! {
            existing => existing,
            conversation => conversation,
            max_title_chars => MAX_TITLE_CHARS,
        },
    )?;
    Ok(rendered)
}

/// Analyzer that runs a command with the rendered prompt as its last argument.
pub struct CommandAnalyzer<'a> {
    runner: &'a dyn CommandRunner,
    command: Vec<String>,
    timeout: Duration,
}

impl<'a> CommandAnalyzer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, command: Vec<String>, timeout: Duration) -> Self {
        Self {
            runner,
            command,
            timeout,
        }
    }
}

impl IssueAnalyzer for CommandAnalyzer<'_> {
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    fn analyze(&self, conversation: &str, existing: &[String]) -> Result<Vec<NewIssue>> {
        let prompt = render_untracked_prompt(conversation, existing)?;
        let spec = CommandSpec::from_argv(&self.command)?
            .arg(prompt)
            .with_timeout(self.timeout);
        let output = self.runner.run(&spec)?;
        if output.timed_out {
            return Err(anyhow!("analyzer timed out after {}s", self.timeout.as_secs()));
        }
        if !output.success() {
            let text = output.combined_text();
            let head: String = text.trim().chars().take(500).collect();
            return Err(anyhow!("analyzer exited with {:?}: {head}", output.exit_code));
        }
        let issues = parse_analysis(&output.stdout_text());
        debug!(count = issues.len(), "analyzer replied");
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::untracked::IssueKind;
    use crate::io::process::CommandOutput;

    struct EchoRunner {
        reply: CommandOutput,
    }

    impl CommandRunner for EchoRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            assert_eq!(spec.program, "claude");
            assert_eq!(spec.timeout, Duration::from_secs(120));
            let prompt = spec.args.last().expect("prompt arg");
            assert!(prompt.contains("- fix the parser\n"));
            assert!(prompt.contains("CONVERSATION TRANSCRIPT:\nUSER: tabs break the lexer\n"));
            Ok(self.reply.clone())
        }
    }

    fn analyze(reply: CommandOutput) -> Result<Vec<NewIssue>> {
        let runner = EchoRunner { reply };
        let analyzer = CommandAnalyzer::new(
            &runner,
            vec!["claude".to_string(), "-p".to_string()],
            Duration::from_secs(120),
        );
        analyzer.analyze("USER: tabs break the lexer", &["Fix the parser".to_string()])
    }

    #[test]
    fn empty_existing_list_renders_none() {
        let prompt = render_untracked_prompt("USER: hi", &[]).expect("render");
        assert!(prompt.contains("do not duplicate):\n(none)\n"));
        assert!(prompt.contains("(max 80 chars)"));
    }

    #[test]
    fn parses_issue_lines_from_stdout() {
        let reply = CommandOutput {
            exit_code: Some(0),
            stdout: b"ISSUE|bug|1|Lexer rejects tabs\n".to_vec(),
            ..CommandOutput::default()
        };
        let issues = analyze(reply).expect("issues");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::Bug);
        assert_eq!(issues[0].title, "Lexer rejects tabs");
    }

    #[test]
    fn failed_or_timed_out_analysis_is_an_error() {
        let failed = CommandOutput {
            exit_code: Some(1),
            stderr: b"not logged in".to_vec(),
            ..CommandOutput::default()
        };
        let err = analyze(failed).unwrap_err();
        assert!(err.to_string().contains("not logged in"));

        let timed_out = CommandOutput {
            timed_out: true,
            ..CommandOutput::default()
        };
        assert!(analyze(timed_out).is_err());
    }
}
