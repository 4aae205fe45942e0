//! Well-known locations under `.claude/`.

use std::path::{Path, PathBuf};

pub const CLAUDE_DIR: &str = ".claude";
pub const SESSION_FILE: &str = "autonomous-session.local.md";
pub const BUILD_MARKER_FILE: &str = "build-already-failing.local";
pub const CONFIG_FILE: &str = "stopgate.toml";
pub const QUALITY_SCRIPT: &str = "scripts/quality-check.sh";

/// Resolved paths for one repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePaths {
    pub root: PathBuf,
    pub claude_dir: PathBuf,
    pub session_path: PathBuf,
    pub build_marker_path: PathBuf,
    pub config_path: PathBuf,
    pub quality_script_path: PathBuf,
}

impl GatePaths {
    pub fn new(root: &Path) -> Self {
        let claude_dir = root.join(CLAUDE_DIR);
        Self {
            root: root.to_path_buf(),
            session_path: claude_dir.join(SESSION_FILE),
            build_marker_path: claude_dir.join(BUILD_MARKER_FILE),
            config_path: claude_dir.join(CONFIG_FILE),
            quality_script_path: claude_dir.join(QUALITY_SCRIPT),
            claude_dir,
        }
    }

    pub fn build_marker_exists(&self) -> bool {
        self.build_marker_path.is_file()
    }
}
