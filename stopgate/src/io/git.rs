//! Git queries used by the gate.
//!
//! All calls are read-only. Failures are reported to the caller, which decides
//! whether a missing signal means "no changes".

use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::core::types::Changes;
use crate::io::process::{CommandRunner, CommandSpec};

/// Wrapper for executing git commands through a [`CommandRunner`].
#[derive(Clone, Copy)]
pub struct Git<'a> {
    runner: &'a dyn CommandRunner,
    timeout: Duration,
}

impl<'a> Git<'a> {
    pub fn new(runner: &'a dyn CommandRunner, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Which categories of uncommitted work exist.
    ///
    /// If `git diff --stat` itself fails (not a repository, git missing) the
    /// repository is treated as clean.
    #[instrument(skip_all)]
    pub fn uncommitted_changes(&self) -> Changes {
        let unstaged = match self.run_capture(&["diff", "--stat"]) {
            Ok(out) => !out.trim().is_empty(),
            Err(err) => {
                debug!(err = %err, "git diff failed, treating as clean");
                return Changes::default();
            }
        };
        let staged = self
            .run_capture(&["diff", "--cached", "--stat"])
            .is_ok_and(|out| !out.trim().is_empty());
        let untracked = self
            .untracked_files()
            .is_ok_and(|files| !files.is_empty());
        let changes = Changes {
            unstaged,
            staged,
            untracked,
        };
        debug!(?changes, "uncommitted changes");
        changes
    }

    /// `(unstaged, staged)` zero-context diffs.
    pub fn zero_context_diffs(&self) -> Result<(String, String)> {
        let unstaged = self.run_capture(&["diff", "-U0"])?;
        let staged = self.run_capture(&["diff", "--cached", "-U0"])?;
        Ok((unstaged, staged))
    }

    pub fn untracked_files(&self) -> Result<Vec<String>> {
        self.run_lines(&["ls-files", "--others", "--exclude-standard"])
    }

    pub fn staged_files(&self) -> Result<Vec<String>> {
        self.run_lines(&["diff", "--cached", "--name-only"])
    }

    pub fn current_branch(&self) -> Result<String> {
        let name = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("git returned an empty branch name"));
        }
        Ok(name.to_string())
    }

    pub fn head_sha(&self) -> Result<String> {
        Ok(self.run_capture(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn run_lines(&self, args: &[&str]) -> Result<Vec<String>> {
        let out = self.run_capture(args)?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let spec = CommandSpec::new("git", args.iter().copied()).with_timeout(self.timeout);
        let output = self.runner.run(&spec)?;
        if !output.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output.stdout_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;

    fn git(runner: &ScriptedRunner) -> Git<'_> {
        Git::new(runner, Duration::from_secs(1))
    }

    #[test]
    fn not_a_repository_means_no_changes() {
        let runner = ScriptedRunner::new().fail("git diff --stat", 128, "fatal: not a git repository");
        assert_eq!(git(&runner).uncommitted_changes(), Changes::default());
        assert_eq!(runner.calls(), vec!["git diff --stat"]);
    }

    #[test]
    fn reports_each_change_category() {
        let runner = ScriptedRunner::new()
            .ok("git diff --stat", "")
            .ok("git diff --cached --stat", " a.rs | 2 +-\n")
            .ok("git ls-files --others --exclude-standard", "new.txt\n");
        let changes = git(&runner).uncommitted_changes();
        assert!(!changes.unstaged);
        assert!(changes.staged);
        assert!(changes.untracked);
    }

    #[test]
    fn lists_skip_blank_lines() {
        let runner = ScriptedRunner::new().ok("git diff --cached --name-only", "a.rs\n\nb.rs\n");
        assert_eq!(git(&runner).staged_files().expect("staged"), vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn branch_is_trimmed() {
        let runner = ScriptedRunner::new().ok("git rev-parse --abbrev-ref HEAD", "main\n");
        assert_eq!(git(&runner).current_branch().expect("branch"), "main");
    }
}
