//! Slack job notifier for GitHub Actions.
//!
//! Run as both the main and the post step of an action. The first invocation
//! in a job posts a "started" message; the second updates it with the job's
//! conclusion.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use notifier::exit_codes;
use notifier::io::actions::ActionsPlatform;
use notifier::io::clients::HttpConnector;
use notifier::io::context::RunContext;
use notifier::io::sleep::ThreadSleeper;
use notifier::logging;
use notifier::run::{inspect, invoke};

#[derive(Parser)]
#[command(
    name = "notifier",
    version,
    about = "Post and update a Slack message for a GitHub Actions job"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Detect the phase (start or end) and act on it. The default.
    Run,
    /// Print the resolved configuration as JSON without changing any state.
    State,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match cli.command.unwrap_or(Command::Run) {
        Command::Run => cmd_run(),
        Command::State => match cmd_state() {
            Ok(()) => exit_codes::OK,
            Err(err) => {
                eprintln!("{:#}", err);
                exit_codes::FAILED
            }
        },
    };
    std::process::exit(code);
}

fn cmd_run() -> i32 {
    let ctx = RunContext::from_process_env();
    let (_, code) = invoke(
        ActionsPlatform::from_process_env(),
        &ctx,
        &HttpConnector,
        &ThreadSleeper,
        chrono::Utc::now().timestamp(),
    );
    code
}

fn cmd_state() -> Result<()> {
    let summary = inspect(ActionsPlatform::from_process_env())?;
    let rendered = serde_json::to_string_pretty(&summary).context("serialize state")?;
    println!("{rendered}");
    Ok(())
}
