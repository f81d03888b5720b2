//! CLI entry point - the composition root.
//!
//! Each stdin line is a finalized utterance; `exit` (or Ctrl-C, or end of
//! input) ends the session. Speech is silenced before the process exits.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use parley_cli::presentation::{PROMPT, render_conversation, report_playback};
use parley_cli::{Cli, CliError, Session, bootstrap};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables before parsing so `env = ...` args see them
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let Session {
        mut orchestrator,
        conversation_events,
        playback_events,
    } = bootstrap(cli)?;

    let renderer = tokio::spawn(render_conversation(conversation_events));
    let reporter = tokio::spawn(report_playback(playback_events));

    if let Some(greeting) = cli.greeting() {
        println!("Assistant: {greeting}");
        orchestrator.greet(greeting)?;
    }

    let (tx, rx) = mpsc::channel(8);
    spawn_stdin_reader(tx)?;

    tokio::select! {
        () = orchestrator.run_session(rx) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Ctrl-C received"),
    }

    let playback = Arc::clone(orchestrator.playback());
    drop(orchestrator);
    playback.interrupt().await;
    playback.shutdown().await?;

    let _ = renderer.await;
    let _ = reporter.await;
    println!();
    Ok(())
}

/// Read utterances on a plain OS thread.
///
/// Blocking stdin on a runtime thread would keep the runtime alive on Ctrl-C.
fn spawn_stdin_reader(tx: mpsc::Sender<String>) -> io::Result<()> {
    std::thread::Builder::new()
        .name("parley-stdin".into())
        .spawn(move || {
            print!("{PROMPT}");
            let _ = io::stdout().flush();

            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let utterance = line.trim();
                if utterance.eq_ignore_ascii_case("exit") {
                    break;
                }
                if utterance.is_empty() {
                    print!("{PROMPT}");
                    let _ = io::stdout().flush();
                    continue;
                }
                if tx.blocking_send(utterance.to_string()).is_err() {
                    break;
                }
            }
        })?;
    Ok(())
}
