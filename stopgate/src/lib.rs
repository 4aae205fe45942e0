//! Exit gate for autonomous agent work loops.
//!
//! Every time the driving agent tries to stop, the host runtime invokes
//! `stopgate check`. The gate decides whether the stop is permitted (exit 0)
//! or blocked so outstanding work continues (exit 2). The architecture
//! follows a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (diff extraction, content rules,
//!   question triage, session transitions). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (git, issue tracker, CI, quality
//!   gate, oracle, session file, transcript). Every external process goes
//!   through one [`io::process::CommandRunner`] seam so tests can script it.
//!
//! Orchestration modules ([`engine`], [`arbiter`], [`session`], [`precompact`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod arbiter;
pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod precompact;
pub mod report;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
