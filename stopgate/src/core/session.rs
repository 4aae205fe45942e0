//! Session state transitions.

use std::collections::BTreeSet;

use crate::core::issue_id::IssueId;
use crate::core::types::SessionState;

impl SessionState {
    /// Fresh state for a session starting with `snapshot` outstanding.
    pub fn started(snapshot: BTreeSet<IssueId>) -> Self {
        Self {
            iteration: 0,
            last_issue_change_iteration: 0,
            issue_snapshot: snapshot,
        }
    }

    pub fn iterations_since_change(&self) -> u32 {
        self.iteration.saturating_sub(self.last_issue_change_iteration)
    }

    pub fn is_stale(&self, threshold: u32) -> bool {
        self.iterations_since_change() >= threshold
    }

    /// Clamp `last_issue_change_iteration` so it never exceeds `iteration`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.last_issue_change_iteration > self.iteration {
            self.last_issue_change_iteration = self.iteration;
        }
        self
    }
}

/// Result of advancing a session by one stop attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub state: SessionState,
    /// True when the outstanding issue set differs from the previous snapshot.
    pub changed: bool,
}

/// Increment the iteration and replace the snapshot with `current`.
///
/// A differing snapshot moves `last_issue_change_iteration` to the new iteration.
pub fn advance(prev: &SessionState, current: BTreeSet<IssueId>) -> Advance {
    let iteration = prev.iteration.saturating_add(1);
    let changed = current != prev.issue_snapshot;
    let last_issue_change_iteration = if changed {
        iteration
    } else {
        prev.last_issue_change_iteration.min(iteration)
    };
    Advance {
        state: SessionState {
            iteration,
            last_issue_change_iteration,
            issue_snapshot: current,
        },
        changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> BTreeSet<IssueId> {
        raw.iter().filter_map(|id| IssueId::new(*id)).collect()
    }

    #[test]
    fn unchanged_snapshot_keeps_last_change() {
        let prev = SessionState {
            iteration: 3,
            last_issue_change_iteration: 1,
            issue_snapshot: ids(&["p-1", "p-2"]),
        };
        let next = advance(&prev, ids(&["p-2", "p-1"]));
        assert!(!next.changed);
        assert_eq!(next.state.iteration, 4);
        assert_eq!(next.state.last_issue_change_iteration, 1);
        assert_eq!(next.state.iterations_since_change(), 3);
    }

    #[test]
    fn changed_snapshot_resets_staleness() {
        let prev = SessionState {
            iteration: 9,
            last_issue_change_iteration: 2,
            issue_snapshot: ids(&["p-1"]),
        };
        let next = advance(&prev, ids(&[]));
        assert!(next.changed);
        assert_eq!(next.state.last_issue_change_iteration, 10);
        assert!(!next.state.is_stale(5));
    }

    #[test]
    fn staleness_threshold_is_inclusive() {
        let state = SessionState {
            iteration: 10,
            last_issue_change_iteration: 5,
            issue_snapshot: BTreeSet::new(),
        };
        assert!(state.is_stale(5));
        assert!(!state.is_stale(6));
    }

    #[test]
    fn advance_preserves_invariant() {
        let prev = SessionState {
            iteration: 2,
            last_issue_change_iteration: 7,
            issue_snapshot: BTreeSet::new(),
        };
        let next = advance(&prev, BTreeSet::new());
        assert!(next.state.last_issue_change_iteration <= next.state.iteration);
        let clamped = prev.normalized();
        assert_eq!(clamped.last_issue_change_iteration, 2);
    }
}
