//! Stateless content scanners over added lines.
//!
//! Each scanner returns a [`CheckOutcome`] whose messages read
//! `file:line: description`. None of them touch the filesystem; the large-file
//! scanner receives file sizes gathered by the probe.

use crate::core::rules::{Classification, RULES, first_match};
use crate::core::types::{AddedLine, CheckOutcome};

/// Files strictly larger than this are reported.
pub const LARGE_FILE_THRESHOLD_BYTES: u64 = 512_000;

/// Run every rule of `classification` over the added lines (one message per line).
pub fn scan(classification: Classification, lines: &[AddedLine]) -> CheckOutcome {
    let blocking = RULES
        .iter()
        .any(|rule| rule.classification == classification && rule.blocking);
    let messages = lines
        .iter()
        .filter_map(|added| {
            first_match(classification, &added.file, &added.content)
                .map(|(_, description)| format!("{}:{}: {}", added.file, added.line, description))
        })
        .collect();
    CheckOutcome::new(blocking, messages)
}

pub fn scan_secrets(lines: &[AddedLine]) -> CheckOutcome {
    scan(Classification::Secret, lines)
}

pub fn scan_suppressions(lines: &[AddedLine]) -> CheckOutcome {
    scan(Classification::Suppression, lines)
}

pub fn scan_empty_handlers(lines: &[AddedLine]) -> CheckOutcome {
    scan(Classification::EmptyHandler, lines)
}

pub fn scan_untracked_work(lines: &[AddedLine]) -> CheckOutcome {
    scan(Classification::UntrackedWork, lines)
}

/// Report files above `threshold` bytes. Informational only.
pub fn scan_large_files(sizes: &[(String, u64)], threshold: u64) -> CheckOutcome {
    let messages = sizes
        .iter()
        .filter(|(_, size)| *size > threshold)
        .map(|(path, size)| format!("{path}: {}", format_size(*size)))
        .collect();
    CheckOutcome::new(false, messages)
}

/// Render a byte count as `1.5MB` (at least one MiB) or `640KB`.
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes = bytes as f64;
    let mib = bytes / (KIB * KIB);
    if mib >= 1.0 {
        format!("{mib:.1}MB")
    } else {
        format!("{:.0}KB", bytes / KIB)
    }
}

/// Every scanner's outcome for one set of changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub secrets: CheckOutcome,
    pub suppressions: CheckOutcome,
    pub empty_handlers: CheckOutcome,
    pub untracked_work: CheckOutcome,
    pub large_files: CheckOutcome,
}

impl ScanReport {
    pub fn has_blocking(&self) -> bool {
        self.outcomes().any(CheckOutcome::blocks)
    }

    fn outcomes(&self) -> impl Iterator<Item = &CheckOutcome> {
        [
            &self.suppressions,
            &self.empty_handlers,
            &self.secrets,
            &self.untracked_work,
            &self.large_files,
        ]
        .into_iter()
    }
}

/// Run all scanners.
pub fn scan_all(lines: &[AddedLine], sizes: &[(String, u64)], threshold: u64) -> ScanReport {
    ScanReport {
        secrets: scan_secrets(lines),
        suppressions: scan_suppressions(lines),
        empty_handlers: scan_empty_handlers(lines),
        untracked_work: scan_untracked_work(lines),
        large_files: scan_large_files(sizes, threshold),
    }
}
