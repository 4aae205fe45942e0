//! Quality gate adapter.
//!
//! The gate is whatever the repository uses to say "this builds and passes":
//! an explicit command from config, else `.claude/scripts/quality-check.sh`,
//! else `just check`. A gate that cannot run counts as failing.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::io::paths::{CLAUDE_DIR, GatePaths, QUALITY_SCRIPT};
use crate::io::process::{CommandRunner, CommandSpec};

/// Pass/fail plus the combined output of the quality gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityReport {
    pub passed: bool,
    pub output: String,
}

impl QualityReport {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            passed: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: output.into(),
        }
    }
}

pub trait QualityGate {
    fn run(&self) -> Result<QualityReport>;
}

/// Pick the quality command for the repository at `paths.root`.
///
/// The script path is passed relative to the root, where the runner executes.
pub fn resolve_quality_command(paths: &GatePaths, configured: &[String]) -> Vec<String> {
    if !configured.is_empty() {
        return configured.to_vec();
    }
    if paths.quality_script_path.is_file() {
        return vec![
            "bash".to_string(),
            format!("{CLAUDE_DIR}/{QUALITY_SCRIPT}"),
        ];
    }
    vec!["just".to_string(), "check".to_string()]
}

/// Runs the resolved quality command through a [`CommandRunner`].
pub struct CommandQualityGate<R: CommandRunner> {
    runner: R,
    command: Vec<String>,
    timeout: Duration,
}

impl<R: CommandRunner> CommandQualityGate<R> {
    pub fn new(runner: R, command: Vec<String>, timeout: Duration) -> Self {
        Self {
            runner,
            command,
            timeout,
        }
    }
}

impl<R: CommandRunner> QualityGate for CommandQualityGate<R> {
    #[instrument(skip_all, fields(command = %self.command.join(" ")))]
    fn run(&self) -> Result<QualityReport> {
        let spec = CommandSpec::from_argv(&self.command)?.with_timeout(self.timeout);
        let output = match self.runner.run(&spec) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %err, "quality gate could not run");
                return Ok(QualityReport::failed(format!("{err:#}")));
            }
        };
        let mut text = output.combined_text();
        if output.timed_out {
            warn!("quality gate timed out");
            text.push_str(&format!(
                "\nquality gate timed out after {}s\n",
                self.timeout.as_secs()
            ));
        }
        debug!(exit_code = ?output.exit_code, "quality gate finished");
        if output.success() {
            Ok(QualityReport::passed(text))
        } else {
            Ok(QualityReport::failed(text))
        }
    }
}

/// Last `max_lines` lines of trimmed output, with the total line count when cut.
///
/// Returns `(total_lines, kept_lines)`.
pub fn tail_lines(output: &str, max_lines: usize) -> (usize, Vec<&str>) {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return (0, Vec::new());
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    let total = lines.len();
    let kept = lines[total.saturating_sub(max_lines)..].to_vec();
    (total, kept)
}
