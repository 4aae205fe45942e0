//! CI status via the `gh` CLI.

use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::core::types::BuildStatus;
use crate::io::git::Git;
use crate::io::process::{CommandOutput, CommandRunner, CommandSpec};

const RUNNING_STATUSES: &[&str] = &["in_progress", "queued", "waiting", "pending", "requested"];
const FAILED_CONCLUSIONS: &[&str] = &["failure", "cancelled", "timed_out", "startup_failure"];
const SHA_PREFIX_LEN: usize = 7;

/// One entry of `gh run list --json status,conclusion,name,headSha`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GhRun {
    pub status: String,
    pub conclusion: Option<String>,
    pub name: String,
    #[serde(rename = "headSha")]
    pub head_sha: String,
}

/// Classify runs belonging to `head_sha`. Failures win over running runs.
///
/// Runs whose sha does not start with the first 7 characters of `head_sha`
/// are ignored. An unknown head sha (or run sha) keeps the run.
pub fn classify_runs(runs: &[GhRun], head_sha: &str) -> BuildStatus {
    let prefix: String = head_sha.chars().take(SHA_PREFIX_LEN).collect();
    let mut failed = Vec::new();
    let mut running = Vec::new();

    for run in runs {
        if !prefix.is_empty() && !run.head_sha.is_empty() && !run.head_sha.starts_with(&prefix) {
            continue;
        }
        let name = if run.name.is_empty() {
            "unknown".to_string()
        } else {
            run.name.clone()
        };
        if RUNNING_STATUSES.contains(&run.status.as_str()) {
            running.push(name);
        } else if run
            .conclusion
            .as_deref()
            .is_some_and(|c| FAILED_CONCLUSIONS.contains(&c))
        {
            failed.push(name);
        }
    }

    if !failed.is_empty() {
        BuildStatus::Failed(failed)
    } else if !running.is_empty() {
        BuildStatus::Running(running)
    } else {
        BuildStatus::Clear
    }
}

pub struct Ci<'a> {
    runner: &'a dyn CommandRunner,
    program: &'a str,
    run_limit: u32,
    timeout: Duration,
}

impl<'a> Ci<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        program: &'a str,
        run_limit: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            program,
            run_limit,
            timeout,
        }
    }

    /// Build status for the current branch and commit. Any failure is [`BuildStatus::Clear`].
    #[instrument(skip_all)]
    pub fn build_status(&self) -> BuildStatus {
        match self.query() {
            Ok(status) => {
                debug!(?status, "ci status");
                status
            }
            Err(err) => {
                debug!(err = %err, "ci status unavailable");
                BuildStatus::Clear
            }
        }
    }

    fn query(&self) -> Result<BuildStatus> {
        let git = Git::new(self.runner, self.timeout);
        let branch = git.current_branch()?;

        let auth = self.gh(vec!["auth".into(), "status".into()])?;
        if !auth.success() {
            return Err(anyhow!("{} is not authenticated", self.program));
        }

        let listed = self.gh(vec![
            "run".into(),
            "list".into(),
            "--branch".into(),
            branch,
            "--limit".into(),
            self.run_limit.to_string(),
            "--json".into(),
            "status,conclusion,name,headSha".into(),
        ])?;
        if !listed.success() {
            return Err(anyhow!("{} run list exited with {:?}", self.program, listed.exit_code));
        }
        let runs: Vec<GhRun> = serde_json::from_slice(&listed.stdout)?;
        if runs.is_empty() {
            return Ok(BuildStatus::Clear);
        }

        let head = git.head_sha().unwrap_or_else(|err| {
            warn!(err = %err, "could not resolve HEAD, considering all runs");
            String::new()
        });
        Ok(classify_runs(&runs, &head))
    }

    fn gh(&self, args: Vec<String>) -> Result<CommandOutput> {
        let spec = CommandSpec::new(self.program, args).with_timeout(self.timeout);
        self.runner.run(&spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;

    fn run(name: &str, status: &str, conclusion: Option<&str>, sha: &str) -> GhRun {
        GhRun {
            status: status.to_string(),
            conclusion: conclusion.map(str::to_string),
            name: name.to_string(),
            head_sha: sha.to_string(),
        }
    }

    const HEAD: &str = "abc1234deadbeef";

    #[test]
    fn failed_wins_over_running() {
        let runs = vec![
            run("lint", "in_progress", None, HEAD),
            run("ci", "completed", Some("failure"), HEAD),
            run("docs", "completed", Some("timed_out"), HEAD),
        ];
        assert_eq!(
            classify_runs(&runs, HEAD),
            BuildStatus::Failed(vec!["ci".to_string(), "docs".to_string()])
        );
    }

    #[test]
    fn runs_for_other_commits_are_ignored() {
        let runs = vec![
            run("ci", "completed", Some("failure"), "fff0000"),
            run("lint", "queued", None, "abc1234ffff"),
        ];
        assert_eq!(
            classify_runs(&runs, HEAD),
            BuildStatus::Running(vec!["lint".to_string()])
        );
    }

    #[test]
    fn success_is_clear() {
        let runs = vec![run("ci", "completed", Some("success"), HEAD)];
        assert_eq!(classify_runs(&runs, HEAD), BuildStatus::Clear);
        assert_eq!(classify_runs(&[], HEAD), BuildStatus::Clear);
    }

    #[test]
    fn parses_gh_json() {
        let json = r#"[{"status":"completed","conclusion":"startup_failure","name":"ci","headSha":"abc1234"},
                       {"status":"requested","conclusion":null,"name":"","headSha":"abc1234"}]"#;
        let runs: Vec<GhRun> = serde_json::from_str(json).expect("parse");
        assert_eq!(runs[1].conclusion, None);
        assert_eq!(
            classify_runs(&runs, HEAD),
            BuildStatus::Failed(vec!["ci".to_string()])
        );
    }

    #[test]
    fn unauthenticated_gh_fails_open() {
        let runner = ScriptedRunner::new()
            .ok("git rev-parse --abbrev-ref HEAD", "main\n")
            .fail("gh auth status", 1, "not logged in");
        let ci = Ci::new(&runner, "gh", 5, Duration::from_secs(1));
        assert_eq!(ci.build_status(), BuildStatus::Clear);
    }

    #[test]
    fn queries_runs_for_current_branch() {
        let runner = ScriptedRunner::new()
            .ok("git rev-parse --abbrev-ref HEAD", "feature\n")
            .ok("gh auth status", "")
            .ok(
                "gh run list --branch feature --limit 5 --json status,conclusion,name,headSha",
                r#"[{"status":"in_progress","conclusion":null,"name":"ci","headSha":"abc1234aa"}]"#,
            )
            .ok("git rev-parse HEAD", "abc1234aa\n");
        let ci = Ci::new(&runner, "gh", 5, Duration::from_secs(1));
        assert_eq!(
            ci.build_status(),
            BuildStatus::Running(vec!["ci".to_string()])
        );
    }
}
