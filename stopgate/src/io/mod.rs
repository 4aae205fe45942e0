//! I/O helpers for the gate: external tools, files, and hook input.

pub mod analyzer;
pub mod ci;
pub mod config;
pub mod git;
pub mod hook_input;
pub mod oracle;
pub mod paths;
pub mod probe;
pub mod process;
pub mod quality;
pub mod session_store;
pub mod tracker;
pub mod transcript;
