//! Hook record supplied by the host runtime on stdin.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

/// Fields of the stop-hook record the gate reads. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HookInput {
    pub session_id: Option<String>,
    pub transcript_path: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub hook_event_name: Option<String>,
    pub stop_hook_active: Option<bool>,
    /// Present on pre-tool records.
    pub tool_name: Option<String>,
    pub tool_input: Option<ToolInput>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolInput {
    pub command: Option<String>,
}

impl HookInput {
    /// Shell command of a pre-tool record, if any.
    pub fn tool_command(&self) -> Option<&str> {
        self.tool_input.as_ref()?.command.as_deref()
    }
}

/// Parse a hook record; empty or malformed input yields the default record.
pub fn parse_hook_input(raw: &str) -> HookInput {
    let raw = raw.trim();
    if raw.is_empty() {
        return HookInput::default();
    }
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!(err = %err, "ignoring malformed hook input");
        HookInput::default()
    })
}

pub fn read_hook_input(mut reader: impl Read) -> Result<HookInput> {
    let mut raw = String::new();
    reader
        .read_to_string(&mut raw)
        .context("read hook input")?;
    Ok(parse_hook_input(&raw))
}
