//! Gate configuration stored under `.claude/stopgate.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::scanners::LARGE_FILE_THRESHOLD_BYTES;
use crate::io::process::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_OUTPUT_LIMIT_BYTES};

/// Gate configuration (TOML).
///
/// Every field is optional in the file; missing fields take the defaults the
/// hook has always used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StopGateConfig {
    /// Iterations without an issue change after which the session ends.
    pub staleness_threshold: u32,

    /// Warn in the work-remains report once this many iterations pass without change.
    pub staleness_warning_after: u32,

    /// A user message newer than this lets the agent stop to ask a question.
    pub user_recency_minutes: u32,

    pub large_file_threshold_bytes: u64,

    /// Lines of quality gate output kept in reports.
    pub quality_output_tail_lines: usize,

    pub untracked_files_shown: usize,

    /// Timeout for status queries (git, tracker, CI).
    pub command_timeout_secs: u64,

    /// Bytes of stdout/stderr kept per child process.
    pub output_limit_bytes: usize,

    /// Environment variable that disables the gate when set and non-empty.
    pub disable_env: String,

    pub quality: QualityConfig,
    pub oracle: OracleConfig,
    pub tracker: TrackerConfig,
    pub ci: CiConfig,
    pub precompact: PrecompactConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QualityConfig {
    /// Explicit quality gate command. Empty means auto-detect.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    pub enabled: bool,
    /// Command prefix; the rendered prompt is appended as the last argument.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

/// Untracked-work capture run by `stopgate precompact`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PrecompactConfig {
    pub enabled: bool,
    /// Command prefix; the rendered prompt is appended as the last argument.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    pub program: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CiConfig {
    pub enabled: bool,
    pub program: String,
    pub run_limit: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 120,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: ["claude", "--print", "--model", "haiku", "-p"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout_secs: 60,
        }
    }
}

impl Default for PrecompactConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: ["claude", "--dangerously-skip-permissions", "--max-turns", "1", "-p"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout_secs: 120,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            program: "bd".to_string(),
        }
    }
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "gh".to_string(),
            run_limit: 5,
        }
    }
}

impl Default for StopGateConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: 5,
            staleness_warning_after: 2,
            user_recency_minutes: 5,
            large_file_threshold_bytes: LARGE_FILE_THRESHOLD_BYTES,
            quality_output_tail_lines: 50,
            untracked_files_shown: 10,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            disable_env: "CLAUDE_REPO_CRITIQUE".to_string(),
            quality: QualityConfig::default(),
            oracle: OracleConfig::default(),
            tracker: TrackerConfig::default(),
            ci: CiConfig::default(),
            precompact: PrecompactConfig::default(),
        }
    }
}

impl StopGateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.staleness_threshold == 0 {
            return Err(anyhow!("staleness_threshold must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.quality.timeout_secs == 0 {
            return Err(anyhow!("quality.timeout_secs must be > 0"));
        }
        if self.quality.command.first().is_some_and(|p| p.trim().is_empty()) {
            return Err(anyhow!("quality.command must start with a program"));
        }
        if self.oracle.enabled
            && (self.oracle.command.is_empty() || self.oracle.command[0].trim().is_empty())
        {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.precompact.enabled
            && (self.precompact.command.is_empty()
                || self.precompact.command[0].trim().is_empty())
        {
            return Err(anyhow!("precompact.command must be a non-empty array"));
        }
        if self.precompact.timeout_secs == 0 {
            return Err(anyhow!("precompact.timeout_secs must be > 0"));
        }
        if self.tracker.program.trim().is_empty() {
            return Err(anyhow!("tracker.program must not be empty"));
        }
        if self.ci.enabled && self.ci.program.trim().is_empty() {
            return Err(anyhow!("ci.program must not be empty"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn user_recency(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.user_recency_minutes))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StopGateConfig::default()`.
pub fn load_config(path: &Path) -> Result<StopGateConfig> {
    if !path.exists() {
        let cfg = StopGateConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StopGateConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
