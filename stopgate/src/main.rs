//! `stopgate` CLI.
//!
//! `stopgate check` is registered as the host's stop hook, `stopgate guard`
//! as a pre-tool hook and `stopgate precompact` as a pre-compaction hook. The
//! `session` commands manage the autonomous session file the stop hook reads.

use std::env;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use stopgate::core::commit_guard::{GuardVerdict, OVERRIDE_ENV, check_tool_call};
use stopgate::engine::{Engine, Invocation};
use stopgate::exit_codes;
use stopgate::io::analyzer::CommandAnalyzer;
use stopgate::io::config::{StopGateConfig, load_config};
use stopgate::io::hook_input::{HookInput, read_hook_input};
use stopgate::io::oracle::CommandOracle;
use stopgate::io::paths::GatePaths;
use stopgate::io::probe::{ProbeSettings, SystemProbe};
use stopgate::io::process::SystemRunner;
use stopgate::io::quality::{CommandQualityGate, resolve_quality_command};
use stopgate::io::session_store::SessionStore;
use stopgate::io::tracker::Tracker;
use stopgate::io::transcript::{read_conversation, read_transcript};
use stopgate::precompact::capture_untracked;
use stopgate::session::{clear_session, session_status, start_session};
use stopgate::{logging, report};

#[derive(Parser)]
#[command(
    name = "stopgate",
    version,
    about = "Exit gate for autonomous agent work loops"
)]
struct Cli {
    /// Repository root (defaults to the hook's `cwd`, then the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (defaults to `.claude/stopgate.toml` under the root).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Decide whether the agent may stop. Reads the hook record from stdin; exits 0 or 2.
    Check,
    /// Pre-tool hook: reject `git commit --no-verify` unless acknowledged.
    Guard,
    /// Pre-compaction hook: file tracker issues for work discussed but not tracked. Always exits 0.
    Precompact,
    /// Manage the autonomous session.
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Start a session with the current issue snapshot.
    Start {
        /// Replace an existing session.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the session state.
    Status,
    /// Delete the session file and build marker.
    Clear,
}

fn main() {
    logging::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::ALLOW
            };
            let _ = err.print();
            process::exit(code);
        }
    };

    let code = match cli.command.unwrap_or(Command::Check) {
        Command::Check => cmd_check(cli.root, cli.config.as_deref()),
        Command::Guard => cmd_guard(),
        Command::Precompact => cmd_precompact(cli.root, cli.config.as_deref()),
        Command::Session(cmd) => {
            match cmd_session(cmd, cli.root.as_deref(), cli.config.as_deref()) {
                Ok(()) => exit_codes::ALLOW,
                Err(err) => {
                    eprintln!("{:#}", err);
                    exit_codes::INVALID
                }
            }
        }
    };
    process::exit(code);
}

fn cmd_check(root: Option<PathBuf>, config_path: Option<&Path>) -> i32 {
    let hook = read_stdin_hook();
    debug!(
        event = ?hook.hook_event_name,
        stop_hook_active = ?hook.stop_hook_active,
        "hook input"
    );
    let root = root
        .or_else(|| hook.cwd.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let paths = GatePaths::new(&root);
    let config = config_or_default(config_path.unwrap_or(&paths.config_path));

    let transcript = hook
        .transcript_path
        .as_deref()
        .map(read_transcript)
        .unwrap_or_default();
    let mut invocation = Invocation::new(transcript, Utc::now());
    invocation.disabled_by_env = env::var(&config.disable_env).is_ok_and(|v| !v.is_empty());

    let runner = SystemRunner::new(&root, config.output_limit_bytes);
    let probe = SystemProbe::new(&root, runner.clone(), ProbeSettings::from_config(&config));
    let quality = CommandQualityGate::new(
        runner.clone(),
        resolve_quality_command(&paths, &config.quality.command),
        Duration::from_secs(config.quality.timeout_secs),
    );
    let oracle = CommandOracle::new(
        runner,
        config.oracle.command.clone(),
        Duration::from_secs(config.oracle.timeout_secs),
        config.user_recency_minutes,
    );
    let store = SessionStore::new(paths.session_path.clone());
    let engine = Engine {
        config: &config,
        paths: &paths,
        store: &store,
        probe: &probe,
        quality: &quality,
        oracle: &oracle,
    };

    let decision = engine.evaluate(&invocation);
    if !decision.messages.is_empty() {
        eprintln!("{}", decision.text());
    }
    decision.exit_code()
}

fn cmd_guard() -> i32 {
    let hook = read_stdin_hook();
    let tool_name = hook.tool_name.as_deref().unwrap_or_default();
    let command = hook.tool_command().unwrap_or_default();
    let override_value = env::var(OVERRIDE_ENV).unwrap_or_default();
    match check_tool_call(tool_name, command, &override_value) {
        GuardVerdict::NotApplicable => exit_codes::ALLOW,
        GuardVerdict::Acknowledged => {
            println!("--no-verify acknowledged by {OVERRIDE_ENV}");
            exit_codes::ALLOW
        }
        GuardVerdict::Rejected => {
            eprintln!("{}", report::no_verify_rejected());
            exit_codes::BLOCK
        }
    }
}

fn cmd_precompact(root: Option<PathBuf>, config_path: Option<&Path>) -> i32 {
    let hook = read_stdin_hook();
    let Some(transcript_path) = hook.transcript_path.as_deref() else {
        debug!("no transcript path, nothing to capture");
        return exit_codes::ALLOW;
    };
    let root = root
        .or_else(|| hook.cwd.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let paths = GatePaths::new(&root);
    let config = config_or_default(config_path.unwrap_or(&paths.config_path));
    if !config.precompact.enabled {
        return exit_codes::ALLOW;
    }

    let conversation = read_conversation(transcript_path);
    let runner = SystemRunner::new(&root, config.output_limit_bytes);
    let tracker = Tracker::new(&runner, &config.tracker.program, config.command_timeout());
    let analyzer = CommandAnalyzer::new(
        &runner,
        config.precompact.command.clone(),
        Duration::from_secs(config.precompact.timeout_secs),
    );
    let outcome = capture_untracked(&conversation, &tracker, &analyzer);
    for issue in &outcome.created {
        eprintln!("created [{}] P{} {}", issue.kind, issue.priority, issue.title);
    }
    if !outcome.created.is_empty() {
        eprintln!("{} untracked issue(s) filed", outcome.created.len());
    }
    exit_codes::ALLOW
}

fn cmd_session(cmd: SessionCommand, root: Option<&Path>, config_path: Option<&Path>) -> Result<()> {
    let root = root.unwrap_or(Path::new("."));
    let paths = GatePaths::new(root);
    let store = SessionStore::new(paths.session_path.clone());
    match cmd {
        SessionCommand::Start { force } => {
            let config = load_config(config_path.unwrap_or(&paths.config_path))?;
            let runner = SystemRunner::new(root, config.output_limit_bytes);
            let probe = SystemProbe::new(root, runner, ProbeSettings::from_config(&config));
            let outcome = start_session(&paths, &store, &probe, force)?;
            println!(
                "session started: {} outstanding issue(s)",
                outcome.state.issue_snapshot.len()
            );
            if outcome.build_already_failing {
                println!("build is already failing; CI gate skipped for this session");
            }
        }
        SessionCommand::Status => println!("{}", session_status(&paths, &store)),
        SessionCommand::Clear => {
            clear_session(&paths, &store)?;
            println!("session cleared");
        }
    }
    Ok(())
}

fn read_stdin_hook() -> HookInput {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return HookInput::default();
    }
    read_hook_input(stdin.lock()).unwrap_or_else(|err| {
        warn!(err = %err, "could not read hook input");
        HookInput::default()
    })
}

/// `check` never fails on configuration; a bad file falls back to defaults.
fn config_or_default(path: &Path) -> StopGateConfig {
    load_config(path).unwrap_or_else(|err| {
        warn!(err = %format!("{err:#}"), "invalid config, using defaults");
        StopGateConfig::default()
    })
}
