//! docchat - ask questions about your documents from the terminal

mod commands;
mod config;
mod ui;
mod utils;

use clap::Parser;
use docchat_core::{
    ControllerConfig, ControllerHandle, ConversationEvent, HttpTransport, SessionIdentity, Turn,
    TurnController, TurnStatus,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_LOG_FILTER: &str = "docchat=debug,docchat_core=debug,docchat_api=debug";

/// docchat - ask questions about your documents
#[derive(Parser, Debug)]
#[command(name = "docchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the answer service (default: http://localhost:8000, or DOCCHAT_URL)
    #[arg(short, long)]
    url: Option<String>,

    /// Reuse an existing session id instead of generating a new one
    #[arg(long)]
    session_id: Option<String>,

    /// Ask a single question, print the answer, and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Disable TUI mode (use simple stdin/stdout)
    #[arg(long)]
    no_tui: bool,

    /// Verbose output (debug logging; written to a log file in TUI mode)
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

fn log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docchat")
        .join("docchat.log")
}

/// Install the tracing subscriber. In TUI mode stderr belongs to the screen,
/// so logs go to a file instead.
fn init_logging(to_file: bool) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if to_file {
        let path = log_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    let use_tui = args.command.is_none()
        && !args.no_tui
        && cfg.tui.unwrap_or(true)
        && std::io::stdout().is_terminal();

    if args.verbose {
        init_logging(use_tui)?;
    }

    // CLI takes precedence over the environment, which beats the config file
    let base_url = cfg.resolve_base_url(args.url, std::env::var("DOCCHAT_URL").ok());
    let transport = Arc::new(HttpTransport::new(base_url.as_str(), cfg.request_timeout())?);

    let session = Arc::new(match args.session_id {
        Some(id) => SessionIdentity::with_id(id),
        None => SessionIdentity::new(),
    });
    tracing::debug!(%base_url, session_id = %session.id(), "starting");

    // A one-shot question prints only its answer
    let greeting = if args.command.is_some() {
        None
    } else {
        cfg.greeting()
    };

    let controller = TurnController::new(ControllerConfig { greeting }, session, transport);
    let handle = controller.handle();
    let events = controller.subscribe();
    let task = tokio::spawn(controller.run());

    // Whether the session ended without a failed request
    let result = if let Some(question) = args.command {
        run_command(&handle, &question).await
    } else if use_tui {
        ui::run_tui(handle.clone(), base_url, cfg.theme()).await.map(|()| true)
    } else {
        run_interactive(&handle, events).await.map(|()| true)
    };

    let _ = handle.shutdown();
    let _ = task.await;

    if !result? {
        std::process::exit(1);
    }
    Ok(())
}

/// Print a resolved assistant turn; failures go to stderr
fn print_turn(turn: &Turn) {
    let content = turn.content().unwrap_or_default();
    match turn.status() {
        Some(TurnStatus::Failed) => eprintln!("{}", content),
        Some(TurnStatus::Cancelled) => println!("[{}]", content),
        _ => println!("{}", content),
    }
}

fn prompt() {
    use std::io::Write;
    print!("> ");
    std::io::stdout().flush().ok();
}

/// Ask one question and print the outcome.
/// Returns `false` if the request failed.
async fn run_command(handle: &ControllerHandle, question: &str) -> anyhow::Result<bool> {
    if question.trim().is_empty() {
        anyhow::bail!("Nothing to ask: the question is empty");
    }

    let mut snapshots = handle.watch();
    handle.submit(question)?;

    let settled = snapshots.wait_for(|s| {
        !s.in_flight
            && s
                .last_turn()
                .and_then(Turn::status)
                .is_some_and(|status| status.is_terminal())
    });

    tokio::select! {
        snapshot = settled => {
            let turn = snapshot?.last_turn().cloned();
            let Some(turn) = turn else {
                return Ok(true);
            };
            print_turn(&turn);
            Ok(turn.status() != Some(TurnStatus::Failed))
        }
        _ = tokio::signal::ctrl_c() => {
            handle.stop()?;
            eprintln!("Stopped.");
            Ok(true)
        }
    }
}

async fn run_interactive(
    handle: &ControllerHandle,
    mut events: broadcast::Receiver<ConversationEvent>,
) -> anyhow::Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let snapshot = handle.snapshot();
    if std::io::stderr().is_terminal() {
        eprintln!("docchat session: {}", snapshot.session_id);
        eprintln!("Type /help for commands.");
        eprintln!();
    }
    for turn in &snapshot.turns {
        print_turn(turn);
    }
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // EOF
                    break;
                };
                let input = line.trim();
                if input.is_empty() {
                    prompt();
                    continue;
                }

                if let Some(command) = commands::parse_command(input) {
                    match command {
                        commands::Command::Pause => {
                            if handle.snapshot().in_flight {
                                handle.pause()?;
                            } else {
                                println!("Nothing to pause.");
                                prompt();
                            }
                        }
                        commands::Command::Resume => {
                            if handle.snapshot().paused {
                                handle.resume()?;
                                println!("Resuming...");
                            } else {
                                println!("Nothing to resume.");
                                prompt();
                            }
                        }
                        commands::Command::Stop => {
                            handle.stop()?;
                            println!("Stopped.");
                            prompt();
                        }
                        commands::Command::Help => {
                            println!("{}", commands::help_message());
                            prompt();
                        }
                        commands::Command::Quit => break,
                        commands::Command::Unknown(name) => {
                            println!("Unknown command: /{}", name);
                            println!("Type /help for available commands.");
                            prompt();
                        }
                    }
                    continue;
                }

                if handle.snapshot().in_flight {
                    println!("Still waiting on the previous answer. Use /pause or /stop first.");
                    continue;
                }
                handle.submit(line)?;
            }

            event = events.recv() => {
                match event {
                    Ok(ConversationEvent::TurnResolved { turn, .. }) => {
                        print_turn(&turn);
                        println!();
                        prompt();
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "missed conversation events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                if !handle.snapshot().in_flight {
                    break;
                }
                handle.stop()?;
                println!();
                println!("Stopped.");
                prompt();
            }
        }
    }

    Ok(())
}
