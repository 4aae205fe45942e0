//! Orchestration for the `session` commands.
//!
//! Starting a session writes the session file with iteration 0 and the current
//! issue snapshot. When CI is already failing at that point, a marker file is
//! written and the build gate skips CI for the rest of the session.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::core::types::{BuildStatus, SessionState};
use crate::io::paths::GatePaths;
use crate::io::probe::RepoProbe;
use crate::io::session_store::SessionStore;

/// Outcome of `stopgate session start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub state: SessionState,
    /// The build was already failing and the marker was written.
    pub build_already_failing: bool,
}

pub fn start_session(
    paths: &GatePaths,
    store: &SessionStore,
    probe: &dyn RepoProbe,
    force: bool,
) -> Result<StartOutcome> {
    if store.exists() && !force {
        bail!(
            "session already active at {} (use --force to restart)",
            store.path().display()
        );
    }
    let state = SessionState::started(probe.issue_counts().snapshot());
    store.save(&state)?;

    let build_already_failing = matches!(probe.build_status(), BuildStatus::Failed(_));
    if build_already_failing {
        fs::create_dir_all(&paths.claude_dir)
            .with_context(|| format!("create directory {}", paths.claude_dir.display()))?;
        fs::write(&paths.build_marker_path, "")
            .with_context(|| format!("write {}", paths.build_marker_path.display()))?;
        info!("build already failing, ci gate disabled for this session");
    } else {
        remove_if_present(&paths.build_marker_path)?;
    }
    debug!(snapshot = state.issue_snapshot.len(), "session started");
    Ok(StartOutcome {
        state,
        build_already_failing,
    })
}

/// Human-readable session state.
pub fn session_status(paths: &GatePaths, store: &SessionStore) -> String {
    let Some(state) = store.load() else {
        return "no active session".to_string();
    };
    let mut out = format!(
        "iteration: {}\nlast_issue_change_iteration: {}\niterations_since_change: {}\noutstanding issues: {}\n",
        state.iteration,
        state.last_issue_change_iteration,
        state.iterations_since_change(),
        state.issue_snapshot.len(),
    );
    for id in &state.issue_snapshot {
        out.push_str(&format!("  - {id}\n"));
    }
    if paths.build_marker_exists() {
        out.push_str("build gate: skipped (build was failing at session start)\n");
    }
    out.trim_end().to_string()
}

/// Remove the session file and build marker.
pub fn clear_session(paths: &GatePaths, store: &SessionStore) -> Result<()> {
    store.clear()?;
    remove_if_present(&paths.build_marker_path)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedProbe, TestWorkspace, ids};

    #[test]
    fn start_snapshots_outstanding_issues() {
        let ws = TestWorkspace::new();
        let probe = ScriptedProbe::new().with_issues(&["p-1"], &["p-2"]);
        let outcome = start_session(&ws.paths, &ws.store, &probe, false).expect("start");
        assert_eq!(outcome.state.iteration, 0);
        assert_eq!(ws.store.load().expect("load").issue_snapshot, ids(&["p-1", "p-2"]));
        assert!(!outcome.build_already_failing);
        assert!(!ws.paths.build_marker_exists());
    }

    #[test]
    fn start_refuses_existing_session_without_force() {
        let ws = TestWorkspace::new();
        ws.start_session(&["p-1"]);
        let probe = ScriptedProbe::new();
        let err = start_session(&ws.paths, &ws.store, &probe, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        let outcome = start_session(&ws.paths, &ws.store, &probe, true).expect("force");
        assert!(outcome.state.issue_snapshot.is_empty());
    }

    #[test]
    fn failing_build_writes_marker_and_clear_removes_it() {
        let ws = TestWorkspace::new();
        let probe = ScriptedProbe::new().with_build(BuildStatus::Failed(vec!["ci".into()]));
        let outcome = start_session(&ws.paths, &ws.store, &probe, false).expect("start");
        assert!(outcome.build_already_failing);
        assert!(ws.paths.build_marker_exists());
        assert!(session_status(&ws.paths, &ws.store).contains("build gate: skipped"));

        clear_session(&ws.paths, &ws.store).expect("clear");
        assert!(!ws.store.exists());
        assert!(!ws.paths.build_marker_exists());
        assert_eq!(session_status(&ws.paths, &ws.store), "no active session");
    }

    #[test]
    fn running_build_does_not_write_marker() {
        let ws = TestWorkspace::new();
        let probe = ScriptedProbe::new().with_build(BuildStatus::Running(vec!["ci".into()]));
        start_session(&ws.paths, &ws.store, &probe, false).expect("start");
        assert!(!ws.paths.build_marker_exists());
    }
}
