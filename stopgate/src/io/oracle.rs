//! Oracle abstraction for ambiguous questions.
//!
//! The [`Oracle`] trait decouples the question protocol from the backend that
//! decides (currently a headless `claude --print` call). Tests use scripted
//! oracles that return predetermined verdicts without spawning processes.

use std::time::Duration;

use anyhow::{Result, anyhow};
use minijinja::{Environment, context};
use tracing::{debug, instrument};

use crate::core::question::{OracleVerdict, parse_oracle_response};
use crate::io::process::{CommandRunner, CommandSpec};

const ORACLE_TEMPLATE: &str = include_str!("prompts/oracle.md");

pub trait Oracle {
    /// Classify the trailing assistant `context`. Any failure is an `Err`.
    fn classify(&self, context: &str) -> Result<OracleVerdict>;
}

/// Render the oracle prompt.
pub fn render_oracle_prompt(context: &str, recency_minutes: u32) -> Result<String> {
    let env = Environment::new();
    let rendered = env.render_str(
        ORACLE_TEMPLATE,
        context! {
            context => context.trim(),
            recency_minutes => recency_minutes,
        },
    )?;
    Ok(rendered)
}

/// Oracle that runs a command with the rendered prompt as its last argument.
pub struct CommandOracle<R: CommandRunner> {
    runner: R,
    command: Vec<String>,
    timeout: Duration,
    recency_minutes: u32,
}

impl<R: CommandRunner> CommandOracle<R> {
    pub fn new(runner: R, command: Vec<String>, timeout: Duration, recency_minutes: u32) -> Self {
        Self {
            runner,
            command,
            timeout,
            recency_minutes,
        }
    }
}

impl<R: CommandRunner> Oracle for CommandOracle<R> {
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    fn classify(&self, context: &str) -> Result<OracleVerdict> {
        let prompt = render_oracle_prompt(context, self.recency_minutes)?;
        let spec = CommandSpec::from_argv(&self.command)?
            .arg(prompt)
            .with_timeout(self.timeout);
        let output = self.runner.run(&spec)?;
        if output.timed_out {
            return Err(anyhow!("oracle timed out after {}s", self.timeout.as_secs()));
        }
        if !output.success() {
            return Err(anyhow!("oracle exited with {:?}", output.exit_code));
        }
        let text = output.stdout_text();
        debug!(bytes = text.len(), "oracle replied");
        parse_oracle_response(&text)
            .ok_or_else(|| anyhow!("unrecognized oracle reply: {}", text.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::process::CommandOutput;

    struct EchoRunner {
        reply: CommandOutput,
    }

    impl CommandRunner for EchoRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            assert_eq!(spec.program, "claude");
            let prompt = spec.args.last().expect("prompt arg");
            assert!(prompt.contains("<assistant_output>\nTabs or spaces?\n</assistant_output>"));
            assert!(prompt.contains("within the last 5 minutes"));
            Ok(self.reply.clone())
        }
    }

    fn oracle(reply: CommandOutput) -> CommandOracle<EchoRunner> {
        CommandOracle::new(
            EchoRunner { reply },
            vec!["claude".to_string(), "-p".to_string()],
            Duration::from_secs(60),
            5,
        )
    }

    #[test]
    fn parses_reply_from_stdout() {
        let reply = CommandOutput {
            exit_code: Some(0),
            stdout: b"ANSWER: Use spaces.\n".to_vec(),
            ..CommandOutput::default()
        };
        assert_eq!(
            oracle(reply).classify("Tabs or spaces?").expect("verdict"),
            OracleVerdict::Answer("Use spaces.".to_string())
        );
    }

    #[test]
    fn nonzero_exit_and_garbage_are_errors() {
        let failed = CommandOutput {
            exit_code: Some(1),
            ..CommandOutput::default()
        };
        assert!(oracle(failed).classify("Tabs or spaces?").is_err());

        let garbage = CommandOutput {
            exit_code: Some(0),
            stdout: b"I think spaces".to_vec(),
            ..CommandOutput::default()
        };
        assert!(oracle(garbage).classify("Tabs or spaces?").is_err());
    }

    #[test]
    fn timeout_is_an_error() {
        let timed_out = CommandOutput {
            exit_code: None,
            timed_out: true,
            ..CommandOutput::default()
        };
        assert!(oracle(timed_out).classify("Tabs or spaces?").is_err());
    }
}
