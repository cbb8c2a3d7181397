use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use feedwire::cli::{Args, UserCommand, COMMAND_HELP};
use feedwire::session::{run_session, SessionEnd};

// ---------------------------------------------------------------------------
// Stdin
// ---------------------------------------------------------------------------

/// Parse stdin lines into commands for whichever session is running. The
/// channel closes when stdin does.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<UserCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
        while let Some(line) = lines.next().await {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match UserCommand::parse(&line) {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("{} {}", e.bright_red(), COMMAND_HELP.dimmed());
                }
            }
        }
    });
    rx
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".bright_red().bold(), e);
            std::process::exit(2);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("feedwire={}", config.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    eprintln!("{}", "FEEDWIRE".bright_cyan().bold());
    eprintln!("{}: {}", "Server".bright_yellow(), config.server_url);
    if let Some(filter) = &config.initial_filter {
        eprintln!("{}: {}", "Filter".bright_yellow(), filter);
    }
    eprintln!("{}", COMMAND_HELP.dimmed());

    let mut commands = spawn_stdin_reader();
    loop {
        match run_session(&config, &mut commands, args.assume_yes).await {
            Ok(SessionEnd::Quit) => break,
            Ok(SessionEnd::Reload) => {
                eprintln!("{}", "reloading".bright_magenta());
            }
            Err(e) => {
                eprintln!("{} {}", "connection failed:".bright_red(), e);
            }
        }
        tokio::time::sleep(config.reload_delay()).await;
    }
}
