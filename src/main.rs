//! # AI Terminal CLI (`ai`)
//!
//! The `ai` binary answers free-text requests from the command line,
//! automatically choosing between conversational, command-assistance, and
//! document-analysis handling.
//!
//! ## Usage
//!
//! ```bash
//! ai how do I find files larger than 100MB
//! ai 解释 "ls -la | grep '^d'"
//! ai summarize ~/notes/design.md
//! cat build.log | ai why did this build fail
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ai <query...>` | Answer a one-shot request |
//! | `ai chat` | Start an interactive session |
//! | `ai stats` | Show what context is being remembered |
//! | `ai record <cmd...>` | Log an executed shell command (shell-hook entry point) |

mod assemble;
mod classify;
mod config;
mod environment;
mod gateway;
mod handler;
mod handler_command;
mod handler_conversation;
mod handler_document;
mod models;
mod repl;
mod stats;
mod store;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use crate::classify::classify_mode;
use crate::config::Config;
use crate::environment::EnvironmentSnapshot;
use crate::gateway::MistralGateway;
use crate::handler::dispatch;
use crate::models::Mode;
use crate::store::ContextStore;

/// AI Terminal — a context-aware AI assistant for the command line.
///
/// Free text is classified automatically; use `--mode` to override. Piped
/// standard input is attached to the query as context.
#[derive(Parser)]
#[command(
    name = "ai",
    about = "AI Terminal — a context-aware AI assistant for the command line",
    version,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// The request, as free text.
    #[arg(trailing_var_arg = true)]
    query: Vec<String>,

    /// Force a handling mode instead of auto-detecting.
    #[arg(short, long, global = true, value_enum)]
    mode: Option<Mode>,

    /// Path to the configuration file (TOML).
    ///
    /// Defaults to `~/.ai_terminal/config.toml`, created with defaults on
    /// first use.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Stream the response to stdout as it is generated.
    #[arg(long, global = true)]
    stream: bool,

    /// Show progress details on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show full diagnostic detail on errors.
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    ///
    /// Each exchange is classified and handled like a one-shot request;
    /// responses stream to the terminal. Type `exit` to leave.
    Chat,

    /// Show statistics about the remembered context.
    Stats,

    /// Record an executed shell command into the context log.
    ///
    /// Intended to be called from a shell preexec hook; keeps the last 20
    /// commands available as context for command-mode requests.
    Record {
        /// The command line that was executed.
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let debug = cli.debug;

    init_tracing(cli.verbose, cli.debug);

    if let Err(e) = run(cli).await {
        if debug {
            eprintln!("Error: {:?}", e);
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool, debug: bool) {
    let default_level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(mut cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };

    // An unreadable config falls back to defaults; only a missing
    // credential should stop the request, and that check belongs to the
    // gateway.
    let settings = match config::load_config(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load config ({}); using defaults", e);
            Config::default()
        }
    };

    let state_dir = settings.state_dir()?;
    let mut store = ContextStore::load(&state_dir, settings.terminal.max_history)?;

    match cli.command.take() {
        Some(Commands::Stats) => {
            stats::run_stats(&store);
            Ok(())
        }
        Some(Commands::Record { command }) => {
            let command = command.join(" ");
            let env = EnvironmentSnapshot::capture_basic();
            store.update_environment(Some(env.variables), env.cwd, Some(&command));
            store.save()?;
            tracing::debug!("Recorded command: {}", command);
            Ok(())
        }
        Some(Commands::Chat) => {
            seed_environment(&mut store);
            let gateway = MistralGateway::new(&settings.api)?;
            repl::run_repl(&gateway, &mut store, cli.mode).await?;
            report_save(&store);
            Ok(())
        }
        None => run_query(cli, settings, &mut store).await,
    }
}

async fn run_query(cli: Cli, settings: Config, store: &mut ContextStore) -> Result<()> {
    seed_environment(store);

    let query = cli.query.join(" ");
    let piped = read_piped_stdin()?;

    let input = match (query.trim().is_empty(), piped) {
        (true, None) => {
            Cli::command().print_help().ok();
            return Ok(());
        }
        (true, Some(piped)) => piped,
        (false, None) => query,
        (false, Some(piped)) => format!(
            "Here is context from standard input:\n```\n{}\n```\n\nRequest: {}",
            piped, query
        ),
    };

    let gateway = MistralGateway::new(&settings.api)?;

    let mode = cli
        .mode
        .unwrap_or_else(|| classify_mode(&input, None));
    tracing::info!("Handling request in {} mode", mode);

    let response = dispatch(mode, &gateway, &input, store, cli.stream).await?;
    if !response.streamed {
        println!("{}", response.text);
    }

    store.record_exchange(&input, Some(&response.text), mode);
    report_save(store);

    Ok(())
}

/// Merge the live working directory and filtered environment variables
/// into the store before handling, as every invocation does.
fn seed_environment(store: &mut ContextStore) {
    let env = EnvironmentSnapshot::capture_basic();
    store.update_environment(Some(env.variables), env.cwd, None);
}

/// Read piped standard input, if any. Interactive stdin returns `None`.
fn read_piped_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut content = String::new();
    std::io::stdin()
        .read_to_string(&mut content)
        .context("Failed to read piped stdin")?;

    let content = content.trim().to_string();
    if content.is_empty() {
        Ok(None)
    } else {
        Ok(Some(content))
    }
}

/// Persist the store. Persistence runs last and a failure must not undo
/// the response the user already has, so it only warns.
fn report_save(store: &ContextStore) {
    if let Err(e) = store.save() {
        eprintln!("Warning: failed to save context: {}", e);
    }
}
