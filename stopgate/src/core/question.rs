//! Question triage for the last assistant message.
//!
//! Pure half of the question protocol: pattern matching, user recency, and
//! parsing of the oracle's typed reply. Consulting the oracle lives in
//! [`crate::arbiter`].

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

/// Synthesized answer for "should I continue?" style questions.
pub const CONTINUE_ANSWER: &str = "Yes, please continue.";

/// How much trailing assistant text is considered for continuation checks and the oracle.
pub const CONTEXT_CHARS: usize = 2000;

static QUESTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\?\s*$",
        r"\?\s*\n",
        r"(?i)\bwould you like\b",
        r"(?i)\bdo you want\b",
        r"(?i)\bshould I\b",
        r"(?i)\bcan you\b.*\?",
        r"(?i)\bwhat do you think\b",
        r"(?i)\blet me know\b",
        r"(?i)\bplease confirm\b",
        r"(?i)\bplease clarify\b",
        r"(?i)\bwhich (?:one|option)\b",
        r"(?i)\bhow would you like\b",
        r"(?i)\bwhat would you prefer\b",
    ]
    .into_iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static CONTINUE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bwould you like me to (?:continue|proceed)\b",
        r"(?i)\b(?:should|shall) I (?:continue|proceed|keep going|do the rest)\b",
        r"(?i)\bdo you want me to (?:continue|proceed|keep going|do the rest)\b",
        r"(?i)\bwant me to (?:continue|proceed|keep)\b",
    ]
    .into_iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// True if the text appears to ask the user something.
pub fn looks_like_question(text: &str) -> bool {
    QUESTION_PATTERNS.iter().any(|re| re.is_match(text))
}

/// True if the text asks whether to keep working.
pub fn is_continue_question(text: &str) -> bool {
    CONTINUE_PATTERNS.iter().any(|re| re.is_match(text))
}

/// Last `max_chars` characters of `text`, respecting char boundaries.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// True if the last user message falls inside the recency window ending at `now`.
pub fn is_user_recent(last_user: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    match last_user {
        Some(at) => at >= now - window,
        None => false,
    }
}

/// What to do before (or instead of) consulting the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triage<'a> {
    /// No question, or the user is not around to answer it.
    NotAQuestion,
    /// A continuation question; answer [`CONTINUE_ANSWER`] directly.
    FastAnswer,
    /// Ambiguous; ask the oracle with this trailing context.
    AskOracle(&'a str),
}

pub fn triage(
    text: &str,
    last_user: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: Duration,
) -> Triage<'_> {
    if text.trim().is_empty() || !looks_like_question(text) {
        return Triage::NotAQuestion;
    }
    if !is_user_recent(last_user, now, window) {
        return Triage::NotAQuestion;
    }
    let context = tail_chars(text, CONTEXT_CHARS);
    if is_continue_question(context) {
        return Triage::FastAnswer;
    }
    Triage::AskOracle(context)
}

/// Typed reply from the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleVerdict {
    /// Let the agent stop so the user can reply.
    AllowStop(String),
    /// Inject this answer and keep going.
    Answer(String),
    /// Not a real question; keep going.
    Continue(String),
}

/// Parse `ALLOW_STOP: ...`, `ANSWER: ...` or `CONTINUE: ...` from oracle output.
///
/// The first line carrying one of the prefixes wins; an answer keeps the lines
/// that follow it.
pub fn parse_oracle_response(output: &str) -> Option<OracleVerdict> {
    let lines: Vec<&str> = output.lines().collect();
    for (idx, line) in lines.iter().enumerate() {
        let line = line.trim();
        if let Some(reason) = line.strip_prefix("ALLOW_STOP:") {
            return Some(OracleVerdict::AllowStop(reason.trim().to_string()));
        }
        if let Some(first) = line.strip_prefix("ANSWER:") {
            let mut answer = first.trim().to_string();
            for rest in &lines[idx + 1..] {
                answer.push('\n');
                answer.push_str(rest);
            }
            return Some(OracleVerdict::Answer(answer.trim().to_string()));
        }
        if let Some(reason) = line.strip_prefix("CONTINUE:") {
            return Some(OracleVerdict::Continue(reason.trim().to_string()));
        }
    }
    None
}

/// Result of the whole question protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionOutcome {
    NotAQuestion,
    /// Permit the stop so the user can reply.
    AllowStop(String),
    /// Surface this answer and keep going.
    Answer { text: String, fast_path: bool },
    /// Keep going without an answer.
    Continue,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Duration {
        Duration::minutes(5)
    }

    #[test]
    fn question_patterns() {
        assert!(looks_like_question("Which approach do you prefer?"));
        assert!(looks_like_question("Done.\nAny thoughts?\nThanks"));
        assert!(looks_like_question("Let me know if this works."));
        assert!(!looks_like_question("Implemented the parser and ran the tests."));
    }

    #[test]
    fn continue_patterns() {
        assert!(is_continue_question("Should I continue?"));
        assert!(is_continue_question("Do you want me to do the rest?"));
        assert!(is_continue_question("Want me to keep refactoring?"));
        assert!(!is_continue_question("Should I use tabs or spaces?"));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let text = "ééééé";
        assert_eq!(tail_chars(text, 2), "éé");
        assert_eq!(tail_chars(text, 10), text);
    }

    #[test]
    fn stale_user_is_not_interrupted() {
        let now = Utc::now();
        let stale = Some(now - Duration::minutes(6));
        assert_eq!(triage("Should I continue?", stale, now, window()), Triage::NotAQuestion);
        assert_eq!(triage("Should I continue?", None, now, window()), Triage::NotAQuestion);
    }

    #[test]
    fn recent_continue_question_is_fast_answered() {
        let now = Utc::now();
        let recent = Some(now - Duration::minutes(1));
        assert_eq!(triage("Should I continue?", recent, now, window()), Triage::FastAnswer);
    }

    #[test]
    fn ambiguous_question_goes_to_oracle_with_tail() {
        let now = Utc::now();
        let recent = Some(now - Duration::seconds(30));
        let text = format!("{}Use Postgres or SQLite?", "x".repeat(3000));
        match triage(&text, recent, now, window()) {
            Triage::AskOracle(context) => {
                assert_eq!(context.chars().count(), CONTEXT_CHARS);
                assert!(context.ends_with("SQLite?"));
            }
            other => panic!("unexpected triage {other:?}"),
        }
    }

    #[test]
    fn parses_oracle_replies() {
        assert_eq!(
            parse_oracle_response("ALLOW_STOP: needs a product decision"),
            Some(OracleVerdict::AllowStop("needs a product decision".to_string()))
        );
        assert_eq!(
            parse_oracle_response("Thinking...\nANSWER: Use SQLite.\nIt is simpler."),
            Some(OracleVerdict::Answer("Use SQLite.\nIt is simpler.".to_string()))
        );
        assert_eq!(
            parse_oracle_response("CONTINUE: rhetorical"),
            Some(OracleVerdict::Continue("rhetorical".to_string()))
        );
        assert_eq!(parse_oracle_response("I am not sure"), None);
        assert_eq!(parse_oracle_response(""), None);
    }
}
