//! Helpers for reading and writing `.claude/autonomous-session.local.md`.
//!
//! The session file is a human-readable log with a YAML-style frontmatter
//! header holding the counters and the issue snapshot. Only the three known
//! keys are interpreted; other header lines and the body are preserved.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::issue_id::IssueId;
use crate::core::types::SessionState;

const KEY_ITERATION: &str = "iteration";
const KEY_LAST_CHANGE: &str = "last_issue_change_iteration";
const KEY_SNAPSHOT: &str = "issue_snapshot";

pub const DEFAULT_BODY: &str =
    "# Autonomous Session Log\n\nThis file tracks the autonomous development session.\n";

/// Session file handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the session; a missing or unparseable file is `None`.
    pub fn load(&self) -> Option<SessionState> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), err = %err, "unreadable session file");
                return None;
            }
        };
        let state = parse_session(&contents);
        if state.is_none() {
            warn!(path = %self.path.display(), "malformed session file");
        }
        state
    }

    /// Write `state`, preserving unknown header keys and the body.
    pub fn save(&self, state: &SessionState) -> Result<()> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(contents) => Some(contents),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", self.path.display()));
            }
        };
        let (extra, body) = match existing.as_deref().and_then(split_frontmatter) {
            Some((header, body)) => (unknown_header_lines(header), body.to_string()),
            None => (Vec::new(), DEFAULT_BODY.to_string()),
        };
        let rendered = render_session(state, &extra, &body);
        write_atomic(&self.path, &rendered)?;
        debug!(path = %self.path.display(), iteration = state.iteration, "session saved");
        Ok(())
    }

    /// Delete the session file. A missing file is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "session cleared");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", self.path.display())),
        }
    }
}

/// Parse the header of a session document.
pub fn parse_session(contents: &str) -> Option<SessionState> {
    let (header, _) = split_frontmatter(contents)?;
    let mut state = SessionState::default();
    let mut lines = header.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || line.starts_with([' ', '-']) {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = unquote(value.trim());
        match key.trim() {
            KEY_ITERATION => state.iteration = parse_counter(value)?,
            KEY_LAST_CHANGE => state.last_issue_change_iteration = parse_counter(value)?,
            KEY_SNAPSHOT => {
                state.issue_snapshot = if value.is_empty() {
                    let mut ids = BTreeSet::new();
                    while let Some(item) = lines.peek().and_then(|l| l.trim().strip_prefix('-')) {
                        if let Some(id) = IssueId::new(unquote(item.trim())) {
                            ids.insert(id);
                        }
                        lines.next();
                    }
                    ids
                } else {
                    parse_inline_list(value)?
                };
            }
            _ => {}
        }
    }
    Some(state.normalized())
}

fn parse_counter(value: &str) -> Option<u32> {
    if value.is_empty() || value == "null" {
        return Some(0);
    }
    value.parse().ok()
}

/// `[]` or `[a, b]`.
fn parse_inline_list(value: &str) -> Option<BTreeSet<IssueId>> {
    let inner = value.strip_prefix('[')?.strip_suffix(']')?;
    Some(
        inner
            .split(',')
            .filter_map(|item| IssueId::new(unquote(item.trim())))
            .collect(),
    )
}

fn unquote(v: &str) -> &str {
    if v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')))
    {
        return &v[1..v.len() - 1];
    }
    v
}

/// Header lines that are neither known keys nor items of the snapshot list.
fn unknown_header_lines(header: &str) -> Vec<String> {
    let mut kept = Vec::new();
    let mut in_snapshot_list = false;
    for line in header.lines() {
        let is_continuation = line.starts_with([' ', '-']);
        if in_snapshot_list && is_continuation {
            continue;
        }
        in_snapshot_list = false;
        if !is_continuation
            && let Some((key, value)) = line.split_once(':')
        {
            match key.trim() {
                KEY_ITERATION | KEY_LAST_CHANGE => continue,
                KEY_SNAPSHOT => {
                    in_snapshot_list = value.trim().is_empty();
                    continue;
                }
                _ => {}
            }
        }
        kept.push(line.to_string());
    }
    kept
}

fn render_session(state: &SessionState, extra: &[String], body: &str) -> String {
    let mut buf = String::new();
    buf.push_str("---\n");
    buf.push_str(&format!("{KEY_ITERATION}: {}\n", state.iteration));
    buf.push_str(&format!(
        "{KEY_LAST_CHANGE}: {}\n",
        state.last_issue_change_iteration
    ));
    if state.issue_snapshot.is_empty() {
        buf.push_str(&format!("{KEY_SNAPSHOT}: []\n"));
    } else {
        buf.push_str(&format!("{KEY_SNAPSHOT}:\n"));
        for id in &state.issue_snapshot {
            buf.push_str(&format!("- {id}\n"));
        }
    }
    for line in extra {
        buf.push_str(line);
        buf.push('\n');
    }
    buf.push_str("---\n\n");
    buf.push_str(body.trim_start_matches(['\r', '\n']));
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf
}

/// Split a document into (header, body). Returns None if it doesn't start with frontmatter.
///
/// Delimiter lines may carry trailing whitespace or `\r`, and the closing
/// delimiter may be the last line of the file.
fn split_frontmatter(contents: &str) -> Option<(&str, &str)> {
    let mut lines = contents.split_inclusive('\n');
    let opening = lines.next()?;
    if opening.trim_end() != "---" {
        return None;
    }
    let header_start = opening.len();
    let mut offset = header_start;
    for line in lines {
        if line.trim_end() == "---" {
            return Some((&contents[header_start..offset], &contents[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Temp file next to `path`, unique per process so concurrent hooks never share one.
fn temp_path(path: &Path) -> PathBuf {
    path.with_extension(format!("md.{}.tmp", process::id()))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("session path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = temp_path(path);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("replace session {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ids;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path().join(".claude/autonomous-session.local.md"));
        (temp, store)
    }

    #[test]
    fn parses_block_and_inline_lists() {
        let block = "---\niteration: 3\nlast_issue_change_iteration: 1\nissue_snapshot:\n- p-1\n- 'p-2'\n---\n\nbody\n";
        let state = parse_session(block).expect("state");
        assert_eq!(state.iteration, 3);
        assert_eq!(state.last_issue_change_iteration, 1);
        assert_eq!(state.issue_snapshot, ids(&["p-1", "p-2"]));

        let inline = "---\niteration: 2\nissue_snapshot: [p-1, p-3]\n---\n";
        let state = parse_session(inline).expect("state");
        assert_eq!(state.last_issue_change_iteration, 0);
        assert_eq!(state.issue_snapshot, ids(&["p-1", "p-3"]));
    }

    #[test]
    fn malformed_files_are_absent() {
        assert_eq!(parse_session("# no header\n"), None);
        assert_eq!(parse_session("---\niteration: three\n---\n"), None);
        assert_eq!(parse_session("---\niteration: 1\n"), None);
    }

    #[test]
    fn loaded_state_is_clamped() {
        let doc = "---\niteration: 2\nlast_issue_change_iteration: 9\nissue_snapshot: []\n---\n";
        let state = parse_session(doc).expect("state");
        assert_eq!(state.last_issue_change_iteration, 2);
    }

    #[test]
    fn save_creates_default_body() {
        let (_temp, store) = store();
        assert!(!store.exists());
        assert_eq!(store.load(), None);
        store.save(&SessionState::default()).expect("save");
        let contents = fs::read_to_string(store.path()).expect("read");
        assert_eq!(
            contents,
            format!(
                "---\niteration: 0\nlast_issue_change_iteration: 0\nissue_snapshot: []\n---\n\n{DEFAULT_BODY}"
            )
        );
    }

    #[test]
    fn save_of_load_is_byte_identical() {
        let (_temp, store) = store();
        let state = SessionState {
            iteration: 4,
            last_issue_change_iteration: 2,
            issue_snapshot: ids(&["p-2", "p-1"]),
        };
        store.save(&state).expect("save");
        let first = fs::read_to_string(store.path()).expect("read");
        let loaded = store.load().expect("load");
        assert_eq!(loaded, state);
        store.save(&loaded).expect("save again");
        assert_eq!(fs::read_to_string(store.path()).expect("read"), first);
    }

    #[test]
    fn save_preserves_body_and_unknown_keys() {
        let (_temp, store) = store();
        fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        fs::write(
            store.path(),
            "---\ngoal: ship it\niteration: 1\nissue_snapshot:\n- p-1\n---\n\n# My Log\n\nnotes\n",
        )
        .expect("write");
        let mut state = store.load().expect("load");
        state.iteration = 2;
        store.save(&state).expect("save");
        let contents = fs::read_to_string(store.path()).expect("read");
        assert!(contents.contains("goal: ship it\n"));
        assert!(contents.ends_with("---\n\n# My Log\n\nnotes\n"));
        assert!(contents.contains("iteration: 2\n"));
        assert_eq!(contents.matches("- p-1").count(), 1);
    }

    #[test]
    fn clear_is_idempotent() {
        let (_temp, store) = store();
        store.save(&SessionState::default()).expect("save");
        store.clear().expect("clear");
        assert!(!store.exists());
        store.clear().expect("clear again");
    }

    #[test]
    fn closing_delimiter_at_end_of_file() {
        let doc = "---\niteration: 3\nlast_issue_change_iteration: 1\nissue_snapshot:\n- p-1\n---";
        let state = parse_session(doc).expect("state");
        assert_eq!(state.iteration, 3);
        assert_eq!(state.issue_snapshot, ids(&["p-1"]));
    }

    #[test]
    fn crlf_and_padded_delimiters() {
        let doc = "---\r\niteration: 3\r\nlast_issue_change_iteration: 1\r\nissue_snapshot:\r\n- p-1\r\n---  \r\n\r\nlog\r\n";
        let state = parse_session(doc).expect("state");
        assert_eq!(state.iteration, 3);
        assert_eq!(state.last_issue_change_iteration, 1);
        assert_eq!(state.issue_snapshot, ids(&["p-1"]));
    }

    #[test]
    fn crlf_file_round_trips_through_save() {
        let (_temp, store) = store();
        fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        fs::write(
            store.path(),
            "---\r\nowner: ops\r\niteration: 1\r\nissue_snapshot: [p-1]\r\n---\r\n\r\nnotes\r\n",
        )
        .expect("write");
        let mut state = store.load().expect("load");
        state.iteration = 2;
        store.save(&state).expect("save");
        let contents = fs::read_to_string(store.path()).expect("read");
        assert!(contents.contains("owner: ops\n"));
        assert!(contents.ends_with("notes\r\n"));
        assert_eq!(store.load().expect("reload").iteration, 2);
    }

    #[test]
    fn save_uses_a_per_process_temp_file() {
        let (_temp, store) = store();
        store.save(&SessionState::default()).expect("save");
        let tmp = temp_path(store.path());
        assert!(tmp.to_string_lossy().contains(&process::id().to_string()));
        assert!(!tmp.exists());
    }

    #[test]
    fn failed_write_reports_error() {
        let (_temp, store) = store();
        fs::create_dir_all(temp_path(store.path())).expect("block temp path");
        assert!(store.save(&SessionState::default()).is_err());
    }
}
