//! Extraction of added lines from unified diffs.
//!
//! Input is expected to come from `git diff -U0`, but any unified diff works.
//! Malformed input never fails; it degrades to partial or empty output.

use crate::core::types::AddedLine;

/// Extract added lines from each diff section in order.
///
/// Every section (e.g. unstaged then staged) restarts file and line tracking.
pub fn extract_added_lines(sections: &[&str]) -> Vec<AddedLine> {
    let mut added = Vec::new();
    for section in sections {
        extract_section(section, &mut added);
    }
    added
}

fn extract_section(diff: &str, out: &mut Vec<AddedLine>) {
    let mut file = String::new();
    let mut line_no: u32 = 0;
    let mut in_hunk = false;

    for raw in diff.lines() {
        if let Some(header) = raw.strip_prefix("diff --git ") {
            if let Some(path) = parse_git_header(header) {
                file = path.to_string();
            }
            in_hunk = false;
            continue;
        }

        if raw.starts_with("@@") {
            match parse_hunk_start(raw) {
                Some(start) if !file.is_empty() => {
                    line_no = start;
                    in_hunk = true;
                }
                _ => in_hunk = false,
            }
            continue;
        }

        if !in_hunk {
            // Extended header lines between `diff --git` and the first hunk.
            if let Some(target) = raw.strip_prefix("+++ ")
                && let Some(path) = target.trim_end().strip_prefix("b/")
            {
                file = path.to_string();
            }
            continue;
        }

        if let Some(content) = raw.strip_prefix('+') {
            out.push(AddedLine {
                file: file.clone(),
                line: line_no,
                content: content.to_string(),
            });
            line_no = line_no.saturating_add(1);
        } else if raw.starts_with('-') || raw.starts_with('\\') {
            // Removals and "\ No newline at end of file" do not exist in the new file.
        } else {
            line_no = line_no.saturating_add(1);
        }
    }
}

/// Take the `b/` path from `a/<old> b/<new>`.
fn parse_git_header(header: &str) -> Option<&str> {
    let (_, new_path) = header.rsplit_once(" b/")?;
    let new_path = new_path.trim();
    (!new_path.is_empty()).then_some(new_path)
}

/// Parse the new-file start line from `@@ -a,b +c,d @@ ...`.
fn parse_hunk_start(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("@@")?;
    let plus = rest.find('+')?;
    let digits: String = rest[plus + 1..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    let start: u32 = digits.parse().ok()?;
    Some(start.max(1))
}
