//! Test-only fakes for the gate's seams.
//!
//! Every external signal (processes, repository state, quality gate, oracle)
//! has a scripted stand-in here so gates can be exercised deterministically.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fs;

use anyhow::{Result, anyhow};

use crate::core::issue_id::IssueId;
use crate::core::question::OracleVerdict;
use crate::core::types::{AddedLine, BuildStatus, Changes, IssueCounts, SessionState};
use crate::core::untracked::{IssueKind, NewIssue};
use crate::engine::Engine;
use crate::io::analyzer::IssueAnalyzer;
use crate::io::config::StopGateConfig;
use crate::io::oracle::Oracle;
use crate::io::paths::GatePaths;
use crate::io::probe::RepoProbe;
use crate::io::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::io::quality::{QualityGate, QualityReport};
use crate::io::session_store::SessionStore;

/// Build an id set, panicking on invalid ids.
pub fn ids(raw: &[&str]) -> BTreeSet<IssueId> {
    raw.iter()
        .map(|id| IssueId::new(*id).expect("valid issue id"))
        .collect()
}

/// Runner answering from a table keyed by `program arg1 arg2`.
///
/// Commands missing from the table fail as if the program were not installed.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, CommandOutput>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn respond(mut self, command: &str, output: CommandOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }

    /// Exit 0 with `stdout`.
    #[must_use]
    pub fn ok(self, command: &str, stdout: &str) -> Self {
        self.respond(
            command,
            CommandOutput {
                exit_code: Some(0),
                stdout: stdout.as_bytes().to_vec(),
                ..CommandOutput::default()
            },
        )
    }

    /// Exit `code` with `stderr`.
    #[must_use]
    pub fn fail(self, command: &str, code: i32, stderr: &str) -> Self {
        self.respond(
            command,
            CommandOutput {
                exit_code: Some(code),
                stderr: stderr.as_bytes().to_vec(),
                ..CommandOutput::default()
            },
        )
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let key = spec.display();
        self.calls.borrow_mut().push(key.clone());
        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("spawn {}: no such file or directory", spec.program))
    }
}

/// Probe with fixed answers and a log of which signals were read.
#[derive(Default)]
pub struct ScriptedProbe {
    changes: Changes,
    added_lines: Vec<AddedLine>,
    untracked: Vec<String>,
    staged: Vec<String>,
    sizes: Vec<(String, u64)>,
    issues: RefCell<IssueCounts>,
    build: BuildStatus,
    calls: RefCell<Vec<&'static str>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_changes(mut self, changes: Changes) -> Self {
        self.changes = changes;
        self
    }

    #[must_use]
    pub fn with_added_line(mut self, file: &str, line: u32, content: &str) -> Self {
        self.added_lines.push(AddedLine {
            file: file.to_string(),
            line,
            content: content.to_string(),
        });
        self
    }

    #[must_use]
    pub fn with_untracked(mut self, files: &[&str]) -> Self {
        self.untracked = files.iter().map(|f| f.to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_file_size(mut self, path: &str, size: u64) -> Self {
        self.staged.push(path.to_string());
        self.sizes.push((path.to_string(), size));
        self
    }

    #[must_use]
    pub fn with_issues(self, open: &[&str], in_progress: &[&str]) -> Self {
        self.set_issues(open, in_progress);
        self
    }

    /// Change tracker output between evaluations.
    pub fn set_issues(&self, open: &[&str], in_progress: &[&str]) {
        *self.issues.borrow_mut() = IssueCounts {
            open: ids(open),
            in_progress: ids(in_progress),
        };
    }

    #[must_use]
    pub fn with_build(mut self, build: BuildStatus) -> Self {
        self.build = build;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }
}

impl RepoProbe for ScriptedProbe {
    fn uncommitted_changes(&self) -> Changes {
        self.record("uncommitted_changes");
        self.changes
    }

    fn added_lines(&self) -> Vec<AddedLine> {
        self.record("added_lines");
        self.added_lines.clone()
    }

    fn untracked_files(&self) -> Vec<String> {
        self.record("untracked_files");
        self.untracked.clone()
    }

    fn staged_files(&self) -> Vec<String> {
        self.record("staged_files");
        self.staged.clone()
    }

    fn file_sizes(&self, paths: &[String]) -> Vec<(String, u64)> {
        self.record("file_sizes");
        self.sizes
            .iter()
            .filter(|(path, _)| paths.contains(path))
            .cloned()
            .collect()
    }

    fn issue_counts(&self) -> IssueCounts {
        self.record("issue_counts");
        self.issues.borrow().clone()
    }

    fn build_status(&self) -> BuildStatus {
        self.record("build_status");
        self.build.clone()
    }
}

/// Quality gate with a fixed report.
pub struct ScriptedQualityGate {
    report: Result<QualityReport, String>,
    runs: Cell<usize>,
}

impl ScriptedQualityGate {
    pub fn passing() -> Self {
        Self {
            report: Ok(QualityReport::passed("all checks passed")),
            runs: Cell::new(0),
        }
    }

    pub fn failing(output: &str) -> Self {
        Self {
            report: Ok(QualityReport::failed(output)),
            runs: Cell::new(0),
        }
    }

    /// The runner itself errors (e.g. the command could not be spawned).
    pub fn erroring(message: &str) -> Self {
        Self {
            report: Err(message.to_string()),
            runs: Cell::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.get()
    }
}

impl QualityGate for ScriptedQualityGate {
    fn run(&self) -> Result<QualityReport> {
        self.runs.set(self.runs.get() + 1);
        self.report.clone().map_err(|msg| anyhow!(msg))
    }
}

/// Oracle returning a fixed verdict (or failing) and counting calls.
pub struct ScriptedOracle {
    verdict: Option<OracleVerdict>,
    calls: Cell<usize>,
}

impl ScriptedOracle {
    pub fn replying(verdict: OracleVerdict) -> Self {
        Self {
            verdict: Some(verdict),
            calls: Cell::new(0),
        }
    }

    /// Behaves like a timed-out or crashed oracle.
    pub fn failing() -> Self {
        Self {
            verdict: None,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Oracle for ScriptedOracle {
    fn classify(&self, _context: &str) -> Result<OracleVerdict> {
        self.calls.set(self.calls.get() + 1);
        self.verdict
            .clone()
            .ok_or_else(|| anyhow!("oracle timed out after 60s"))
    }
}

/// Analyzer with a fixed reply that records the titles it was shown.
pub struct ScriptedAnalyzer {
    issues: Option<Vec<NewIssue>>,
    seen_existing: RefCell<Vec<Vec<String>>>,
}

impl ScriptedAnalyzer {
    pub fn replying(issues: Vec<NewIssue>) -> Self {
        Self {
            issues: Some(issues),
            seen_existing: RefCell::new(Vec::new()),
        }
    }

    /// Behaves like an analyzer CLI that exits nonzero.
    pub fn failing() -> Self {
        Self {
            issues: None,
            seen_existing: RefCell::new(Vec::new()),
        }
    }

    /// Existing titles passed to each call.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.seen_existing.borrow().clone()
    }
}

impl IssueAnalyzer for ScriptedAnalyzer {
    fn analyze(&self, _conversation: &str, existing: &[String]) -> Result<Vec<NewIssue>> {
        self.seen_existing.borrow_mut().push(existing.to_vec());
        self.issues
            .clone()
            .ok_or_else(|| anyhow!("analyzer exited with Some(1)"))
    }
}

pub fn new_issue(kind: IssueKind, priority: u8, title: &str) -> NewIssue {
    NewIssue {
        kind,
        priority,
        title: title.to_string(),
    }
}

/// Temporary repository root with resolved paths and a session store.
pub struct TestWorkspace {
    pub temp: tempfile::TempDir,
    pub paths: GatePaths,
    pub store: SessionStore,
    pub config: StopGateConfig,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = GatePaths::new(temp.path());
        let store = SessionStore::new(paths.session_path.clone());
        Self {
            temp,
            paths,
            store,
            config: StopGateConfig::default(),
        }
    }

    /// Write a fresh session with `snapshot` outstanding.
    pub fn start_session(&self, snapshot: &[&str]) {
        self.store
            .save(&SessionState::started(ids(snapshot)))
            .expect("save session");
    }

    pub fn write_session(&self, state: &SessionState) {
        self.store.save(state).expect("save session");
    }

    pub fn write_build_marker(&self) {
        fs::create_dir_all(&self.paths.claude_dir).expect("create .claude");
        fs::write(&self.paths.build_marker_path, "").expect("write marker");
    }

    pub fn engine<'a>(
        &'a self,
        probe: &'a dyn RepoProbe,
        quality: &'a dyn QualityGate,
        oracle: &'a dyn Oracle,
    ) -> Engine<'a> {
        Engine {
            config: &self.config,
            paths: &self.paths,
            store: &self.store,
            probe,
            quality,
            oracle,
        }
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// One transcript line for an assistant text message.
pub fn assistant_line(text: &str) -> String {
    serde_json::json!({
        "type": "assistant",
        "message": {"content": [{"type": "text", "text": text}]},
    })
    .to_string()
}

/// One transcript line for a user message at `timestamp` (RFC 3339).
pub fn user_line(timestamp: &str) -> String {
    serde_json::json!({
        "type": "user",
        "timestamp": timestamp,
        "message": {"content": "go"},
    })
    .to_string()
}
