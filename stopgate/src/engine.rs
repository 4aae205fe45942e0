//! Decision engine: an ordered list of gates evaluated on every stop attempt.
//!
//! Each gate returns `Ok(Some(decision))` when decisive and `Ok(None)` to
//! defer. The first decisive gate wins; if none decides, the stop is allowed.
//! Gates that only read status defer when they error. Gates that write the
//! session or report violations block on error, carrying the error text. The
//! quality gate never errors here: a runner failure is reported as a failing
//! check.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::arbiter::arbitrate;
use crate::core::question::QuestionOutcome;
use crate::core::scanners::scan_all;
use crate::core::session::advance;
use crate::core::types::{Changes, Decision, IssueCounts};
use crate::io::config::StopGateConfig;
use crate::io::oracle::Oracle;
use crate::io::paths::GatePaths;
use crate::io::probe::RepoProbe;
use crate::io::quality::{QualityGate, QualityReport};
use crate::io::session_store::SessionStore;
use crate::io::transcript::TranscriptSummary;
use crate::report::{self, BYPASS_PHRASE, ChangesReport, WorkRemains};

/// Everything the gates need that comes from outside the repository.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub transcript: TranscriptSummary,
    pub now: DateTime<Utc>,
    /// The configured disable variable is set and non-empty.
    pub disabled_by_env: bool,
}

impl Invocation {
    pub fn new(transcript: TranscriptSummary, now: DateTime<Utc>) -> Self {
        Self {
            transcript,
            now,
            disabled_by_env: false,
        }
    }
}

/// Collaborators for one evaluation.
pub struct Engine<'a> {
    pub config: &'a StopGateConfig,
    pub paths: &'a GatePaths,
    pub store: &'a SessionStore,
    pub probe: &'a dyn RepoProbe,
    pub quality: &'a dyn QualityGate,
    pub oracle: &'a dyn Oracle,
}

type Gate = fn(&mut GateRun<'_>) -> Result<Option<Decision>>;

/// What an internal gate error resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnError {
    /// Treat the gate as not decisive.
    Defer,
    /// Block with the error in the guidance.
    Block,
}

/// Gate order. Changing this list changes the policy.
const GATES: &[(&str, Gate, OnError)] = &[
    ("disabled", gate_disabled, OnError::Defer),
    ("fast_path", gate_fast_path, OnError::Defer),
    ("bypass", gate_bypass, OnError::Block),
    ("changes", gate_changes, OnError::Block),
    ("build", gate_build, OnError::Defer),
    ("question", gate_question, OnError::Defer),
    ("session", gate_session, OnError::Block),
    ("no_session", gate_no_session, OnError::Block),
];

/// Per-evaluation state shared by the gates.
struct GateRun<'r> {
    engine: &'r Engine<'r>,
    invocation: &'r Invocation,
    changes: Option<Changes>,
    issues: Option<IssueCounts>,
    injected_answer: Option<String>,
}

impl<'r> GateRun<'r> {
    fn changes(&mut self) -> Changes {
        let probe = self.engine.probe;
        *self.changes.get_or_insert_with(|| probe.uncommitted_changes())
    }

    fn issues(&mut self) -> IssueCounts {
        let probe = self.engine.probe;
        self.issues.get_or_insert_with(|| probe.issue_counts()).clone()
    }

    fn run_quality(&self) -> QualityReport {
        self.engine.quality.run().unwrap_or_else(|err| {
            warn!(err = %err, "quality gate errored, treating as failed");
            QualityReport::failed(format!("{err:#}"))
        })
    }

    fn finish(self, decision: Decision) -> Decision {
        let Some(answer) = self.injected_answer else {
            return decision;
        };
        let mut messages = vec![report::injected_answer(&answer)];
        messages.extend(decision.messages);
        Decision {
            verdict: decision.verdict,
            messages,
        }
    }
}

impl Engine<'_> {
    #[instrument(skip_all)]
    pub fn evaluate(&self, invocation: &Invocation) -> Decision {
        let mut run = GateRun {
            engine: self,
            invocation,
            changes: None,
            issues: None,
            injected_answer: None,
        };
        for (name, gate, on_error) in GATES {
            match gate(&mut run) {
                Ok(Some(decision)) => {
                    debug!(gate = name, verdict = ?decision.verdict, "gate decided");
                    return run.finish(decision);
                }
                Ok(None) => debug!(gate = name, "gate deferred"),
                Err(err) if *on_error == OnError::Defer => {
                    warn!(gate = name, err = %err, "gate failed, deferring");
                }
                Err(err) => {
                    error!(gate = name, err = %format!("{err:#}"), "gate failed, blocking");
                    let message = report::gate_failed(name, &err);
                    return run.finish(Decision::block().with_message(message));
                }
            }
        }
        run.finish(Decision::allow())
    }
}

fn gate_disabled(run: &mut GateRun<'_>) -> Result<Option<Decision>> {
    Ok(run.invocation.disabled_by_env.then(Decision::allow))
}

/// No session and a clean tree: nothing to check.
fn gate_fast_path(run: &mut GateRun<'_>) -> Result<Option<Decision>> {
    if run.engine.store.exists() || run.changes().has_changes() {
        return Ok(None);
    }
    Ok(Some(Decision::allow()))
}

fn gate_bypass(run: &mut GateRun<'_>) -> Result<Option<Decision>> {
    if !run.invocation.transcript.last_assistant_text.contains(BYPASS_PHRASE) {
        return Ok(None);
    }
    let open = run.issues().open.len();
    if open > 0 {
        info!(open, "bypass phrase rejected");
        return Ok(Some(Decision::block().with_message(report::bypass_rejected(open))));
    }
    run.engine.store.clear()?;
    Ok(Some(Decision::allow().with_message(report::bypass_accepted())))
}

fn gate_changes(run: &mut GateRun<'_>) -> Result<Option<Decision>> {
    let changes = run.changes();
    if !changes.has_changes() {
        return Ok(None);
    }
    let engine = run.engine;
    let config = engine.config;

    let lines = engine.probe.added_lines();
    let untracked = engine.probe.untracked_files();
    let mut candidates = engine.probe.staged_files();
    candidates.extend(untracked.iter().cloned());
    let sizes = engine.probe.file_sizes(&candidates);
    let scans = scan_all(&lines, &sizes, config.large_file_threshold_bytes);
    let quality = run.run_quality();

    let text = report::changes(&ChangesReport {
        change_desc: changes.describe(),
        quality: &quality,
        scans: &scans,
        untracked_files: &untracked,
        large_file_threshold: config.large_file_threshold_bytes,
        quality_tail_lines: config.quality_output_tail_lines,
        untracked_shown: config.untracked_files_shown,
    })?;
    debug!(
        blocking_findings = scans.has_blocking(),
        quality_passed = quality.passed,
        "uncommitted changes"
    );
    Ok(Some(Decision::block().with_message(text)))
}

fn gate_build(run: &mut GateRun<'_>) -> Result<Option<Decision>> {
    if run.engine.paths.build_marker_exists() {
        debug!("build already failing at session start, skipping ci");
        return Ok(None);
    }
    let status = run.engine.probe.build_status();
    Ok(report::build_blocked(&status).map(|text| Decision::block().with_message(text)))
}

fn gate_question(run: &mut GateRun<'_>) -> Result<Option<Decision>> {
    let outcome = arbitrate(
        &run.invocation.transcript,
        run.invocation.now,
        run.engine.config,
        run.engine.oracle,
    );
    match outcome {
        QuestionOutcome::AllowStop(reason) => Ok(Some(
            Decision::allow().with_message(report::question_allowed(&reason)),
        )),
        QuestionOutcome::Answer { text, fast_path } => {
            debug!(fast_path, "injecting answer");
            run.injected_answer = Some(text);
            Ok(None)
        }
        QuestionOutcome::Continue | QuestionOutcome::NotAQuestion => Ok(None),
    }
}

fn gate_session(run: &mut GateRun<'_>) -> Result<Option<Decision>> {
    let Some(prev) = run.engine.store.load() else {
        return Ok(None);
    };
    let config = run.engine.config;
    let issues = run.issues();
    let next = advance(&prev, issues.snapshot());
    run.engine.store.save(&next.state)?;

    let state = next.state;
    let since_change = state.iterations_since_change();
    let mut decision = if state.is_stale(config.staleness_threshold) {
        info!(since_change, "session stale, ending");
        run.engine.store.clear()?;
        Decision::allow().with_message(report::staleness(since_change))
    } else if state.issue_snapshot.is_empty() {
        let quality = run.run_quality();
        Decision::block().with_message(report::completion(
            &quality,
            config.quality_output_tail_lines,
        )?)
    } else {
        Decision::block().with_message(report::work_remains(&WorkRemains {
            iteration: state.iteration,
            since_change,
            open: issues.open.len(),
            in_progress: issues.in_progress.len(),
            outstanding: state.issue_snapshot.len(),
            warn: since_change > config.staleness_warning_after,
            threshold: config.staleness_threshold,
        })?)
    };
    if next.changed {
        decision
            .messages
            .insert(0, format!("Issue state changed at iteration {}", state.iteration));
    }
    Ok(Some(decision))
}

/// Outside a session the stop is allowed only when quality gates pass.
fn gate_no_session(run: &mut GateRun<'_>) -> Result<Option<Decision>> {
    let quality = run.run_quality();
    let text = report::pre_exit(&quality, run.engine.config.quality_output_tail_lines)?;
    let decision = if quality.passed {
        Decision::allow()
    } else {
        Decision::block()
    };
    Ok(Some(decision.with_message(text)))
}
