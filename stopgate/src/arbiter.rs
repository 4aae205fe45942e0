//! Question protocol: triage the last assistant message, then consult the oracle.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::core::question::{
    CONTINUE_ANSWER, OracleVerdict, QuestionOutcome, Triage, triage,
};
use crate::io::config::StopGateConfig;
use crate::io::oracle::Oracle;
use crate::io::transcript::TranscriptSummary;

/// Decide how to treat a possible question to the user.
///
/// Oracle failures (and a disabled oracle) resolve to [`QuestionOutcome::Continue`].
pub fn arbitrate(
    transcript: &TranscriptSummary,
    now: DateTime<Utc>,
    config: &StopGateConfig,
    oracle: &dyn Oracle,
) -> QuestionOutcome {
    let triaged = triage(
        &transcript.last_assistant_text,
        transcript.last_user_at,
        now,
        config.user_recency(),
    );
    match triaged {
        Triage::NotAQuestion => QuestionOutcome::NotAQuestion,
        Triage::FastAnswer => {
            debug!("fast path: continuation question");
            QuestionOutcome::Answer {
                text: CONTINUE_ANSWER.to_string(),
                fast_path: true,
            }
        }
        Triage::AskOracle(context) => {
            if !config.oracle.enabled {
                debug!("oracle disabled, continuing");
                return QuestionOutcome::Continue;
            }
            match oracle.classify(context) {
                Ok(OracleVerdict::AllowStop(reason)) => QuestionOutcome::AllowStop(reason),
                Ok(OracleVerdict::Answer(text)) => QuestionOutcome::Answer {
                    text,
                    fast_path: false,
                },
                Ok(OracleVerdict::Continue(reason)) => {
                    debug!(reason, "oracle says continue");
                    QuestionOutcome::Continue
                }
                Err(err) => {
                    warn!(err = %err, "oracle failed, continuing");
                    QuestionOutcome::Continue
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::test_support::ScriptedOracle;

    fn transcript(text: &str, minutes_ago: i64, now: DateTime<Utc>) -> TranscriptSummary {
        TranscriptSummary {
            last_assistant_text: text.to_string(),
            last_user_at: Some(now - Duration::minutes(minutes_ago)),
        }
    }

    #[test]
    fn continuation_question_skips_oracle() {
        let now = Utc::now();
        let oracle = ScriptedOracle::failing();
        let outcome = arbitrate(
            &transcript("Shall I proceed?", 1, now),
            now,
            &StopGateConfig::default(),
            &oracle,
        );
        assert_eq!(
            outcome,
            QuestionOutcome::Answer {
                text: CONTINUE_ANSWER.to_string(),
                fast_path: true
            }
        );
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn oracle_verdicts_map_to_outcomes() {
        let now = Utc::now();
        let t = transcript("Postgres or SQLite?", 1, now);
        let cfg = StopGateConfig::default();

        let allow = ScriptedOracle::replying(OracleVerdict::AllowStop("preference".into()));
        assert_eq!(
            arbitrate(&t, now, &cfg, &allow),
            QuestionOutcome::AllowStop("preference".into())
        );

        let answer = ScriptedOracle::replying(OracleVerdict::Answer("SQLite".into()));
        assert_eq!(
            arbitrate(&t, now, &cfg, &answer),
            QuestionOutcome::Answer {
                text: "SQLite".into(),
                fast_path: false
            }
        );
        assert_eq!(answer.calls(), 1);
    }

    #[test]
    fn oracle_failure_continues() {
        let now = Utc::now();
        let outcome = arbitrate(
            &transcript("Postgres or SQLite?", 1, now),
            now,
            &StopGateConfig::default(),
            &ScriptedOracle::failing(),
        );
        assert_eq!(outcome, QuestionOutcome::Continue);
    }

    #[test]
    fn inactive_user_is_not_asked() {
        let now = Utc::now();
        let oracle = ScriptedOracle::replying(OracleVerdict::AllowStop("x".into()));
        let outcome = arbitrate(
            &transcript("Postgres or SQLite?", 30, now),
            now,
            &StopGateConfig::default(),
            &oracle,
        );
        assert_eq!(outcome, QuestionOutcome::NotAQuestion);
        assert_eq!(oracle.calls(), 0);
    }
}
