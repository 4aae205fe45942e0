//! Detection of `git commit` invocations that skip pre-commit hooks.

use std::sync::LazyLock;

use regex::Regex;

/// Environment variable holding the acknowledgment.
pub const OVERRIDE_ENV: &str = "NO_VERIFY_OK";

/// Value the override variable must contain for a hook-skipping commit to pass.
pub const NO_VERIFY_ACK: &str = "I promise the user has said I can use --no-verify here";

static NO_VERIFY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bgit\s+commit\b.*--no-verify\b",
        // `-n` alone or bundled with other short flags (`-anm`).
        r"\bgit\s+commit\b.*\s-[a-zA-Z]*n",
    ]
    .into_iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// True if a shell command runs `git commit` with `--no-verify` or `-n`.
pub fn skips_commit_hooks(command: &str) -> bool {
    NO_VERIFY_PATTERNS.iter().any(|re| re.is_match(command))
}

/// Outcome of checking one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    /// Not a shell call, or not a hook-skipping commit.
    NotApplicable,
    /// Hook-skipping commit with the acknowledgment present.
    Acknowledged,
    Rejected,
}

pub fn check_tool_call(tool_name: &str, command: &str, override_value: &str) -> GuardVerdict {
    if tool_name != "Bash" || !skips_commit_hooks(command) {
        return GuardVerdict::NotApplicable;
    }
    if override_value.contains(NO_VERIFY_ACK) {
        GuardVerdict::Acknowledged
    } else {
        GuardVerdict::Rejected
    }
}
