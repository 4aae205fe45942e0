//! Stable exit codes for stopgate CLI commands.

/// The stop is permitted (or a session command succeeded).
pub const ALLOW: i32 = 0;
/// Invalid usage or a failed session-management command. Never returned by `check`.
pub const INVALID: i32 = 1;
/// The stop is blocked; guidance was written to stderr.
pub const BLOCK: i32 = 2;
