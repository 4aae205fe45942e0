//! Repository state probe.
//!
//! [`RepoProbe`] is the seam between the engine and the outside world's
//! status signals. Every method is infallible: an unavailable tool is logged
//! and reported as "no signal".

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::diff::extract_added_lines;
use crate::core::types::{AddedLine, BuildStatus, Changes, IssueCounts};
use crate::io::ci::Ci;
use crate::io::config::StopGateConfig;
use crate::io::git::Git;
use crate::io::process::CommandRunner;
use crate::io::tracker::Tracker;

pub trait RepoProbe {
    fn uncommitted_changes(&self) -> Changes;
    fn added_lines(&self) -> Vec<AddedLine>;
    fn untracked_files(&self) -> Vec<String>;
    fn staged_files(&self) -> Vec<String>;
    /// Sizes of the given paths that exist as regular files.
    fn file_sizes(&self, paths: &[String]) -> Vec<(String, u64)>;
    fn issue_counts(&self) -> IssueCounts;
    fn build_status(&self) -> BuildStatus;
}

/// Settings the probe takes from [`StopGateConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    pub timeout: Duration,
    pub tracker_program: String,
    pub ci_enabled: bool,
    pub ci_program: String,
    pub ci_run_limit: u32,
}

impl ProbeSettings {
    pub fn from_config(config: &StopGateConfig) -> Self {
        Self {
            timeout: config.command_timeout(),
            tracker_program: config.tracker.program.clone(),
            ci_enabled: config.ci.enabled,
            ci_program: config.ci.program.clone(),
            ci_run_limit: config.ci.run_limit,
        }
    }
}

/// Production probe over real tools.
pub struct SystemProbe<R: CommandRunner> {
    root: PathBuf,
    runner: R,
    settings: ProbeSettings,
}

impl<R: CommandRunner> SystemProbe<R> {
    pub fn new(root: impl Into<PathBuf>, runner: R, settings: ProbeSettings) -> Self {
        Self {
            root: root.into(),
            runner,
            settings,
        }
    }

    fn git(&self) -> Git<'_> {
        Git::new(&self.runner, self.settings.timeout)
    }
}

impl<R: CommandRunner> RepoProbe for SystemProbe<R> {
    fn uncommitted_changes(&self) -> Changes {
        self.git().uncommitted_changes()
    }

    fn added_lines(&self) -> Vec<AddedLine> {
        match self.git().zero_context_diffs() {
            Ok((unstaged, staged)) => extract_added_lines(&[&unstaged, &staged]),
            Err(err) => {
                warn!(err = %err, "could not read diffs");
                Vec::new()
            }
        }
    }

    fn untracked_files(&self) -> Vec<String> {
        self.git().untracked_files().unwrap_or_else(|err| {
            warn!(err = %err, "could not list untracked files");
            Vec::new()
        })
    }

    fn staged_files(&self) -> Vec<String> {
        self.git().staged_files().unwrap_or_else(|err| {
            warn!(err = %err, "could not list staged files");
            Vec::new()
        })
    }

    fn file_sizes(&self, paths: &[String]) -> Vec<(String, u64)> {
        paths
            .iter()
            .filter_map(|path| match fs::metadata(self.root.join(path)) {
                Ok(meta) if meta.is_file() => Some((path.clone(), meta.len())),
                Ok(_) => None,
                Err(err) => {
                    debug!(path, err = %err, "skipping file size");
                    None
                }
            })
            .collect()
    }

    fn issue_counts(&self) -> IssueCounts {
        Tracker::new(
            &self.runner,
            &self.settings.tracker_program,
            self.settings.timeout,
        )
        .issue_counts()
    }

    fn build_status(&self) -> BuildStatus {
        if !self.settings.ci_enabled {
            return BuildStatus::Clear;
        }
        Ci::new(
            &self.runner,
            &self.settings.ci_program,
            self.settings.ci_run_limit,
            self.settings.timeout,
        )
        .build_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;

    fn settings() -> ProbeSettings {
        ProbeSettings::from_config(&StopGateConfig::default())
    }

    #[test]
    fn added_lines_span_unstaged_then_staged() {
        let unstaged = "diff --git a/a.py b/a.py\n+++ b/a.py\n@@ -1,0 +3,1 @@\n+x = 1\n";
        let staged = "diff --git a/b.py b/b.py\n+++ b/b.py\n@@ -0,0 +1 @@\n+y = 2\n";
        let runner = ScriptedRunner::new()
            .ok("git diff -U0", unstaged)
            .ok("git diff --cached -U0", staged);
        let probe = SystemProbe::new(".", runner, settings());
        let lines = probe.added_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!((lines[0].file.as_str(), lines[0].line), ("a.py", 3));
        assert_eq!((lines[1].file.as_str(), lines[1].line), ("b.py", 1));
    }

    #[test]
    fn file_sizes_skip_missing_and_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("big.bin"), vec![0u8; 2048]).expect("write");
        fs::create_dir(temp.path().join("dir")).expect("mkdir");
        let probe = SystemProbe::new(temp.path(), ScriptedRunner::new(), settings());
        let sizes = probe.file_sizes(&[
            "big.bin".to_string(),
            "dir".to_string(),
            "gone.txt".to_string(),
        ]);
        assert_eq!(sizes, vec![("big.bin".to_string(), 2048)]);
    }

    #[test]
    fn disabled_ci_skips_gh() {
        let mut settings = settings();
        settings.ci_enabled = false;
        let runner = ScriptedRunner::new();
        let probe = SystemProbe::new(".", runner, settings);
        assert_eq!(probe.build_status(), BuildStatus::Clear);
        assert!(probe.runner.calls().is_empty());
    }
}
