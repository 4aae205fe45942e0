//! Deterministic, pure logic shared by the gate.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod commit_guard;
pub mod diff;
pub mod issue_id;
pub mod question;
pub mod rules;
pub mod scanners;
pub mod session;
pub mod types;
pub mod untracked;
