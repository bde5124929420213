//! Meridian CLI
//!
//! Command-line interface for Meridian - per-date tasks and daily memos.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use meridian_core::{parse_date_key, Config, DateKey};

mod commands;
mod logging;
mod output;

use commands::Session;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "meridian")]
#[command(about = "Meridian - per-date tasks and memos with remote document sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file (default: ~/.config/meridian/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Operate on a whole day
    Day {
        #[command(subcommand)]
        command: DayCommands,
    },
    /// Manage daily memos
    Memo {
        #[command(subcommand)]
        command: MemoCommands,
    },
    /// Store a remote access token and push current data
    Login {
        /// Bearer token for the remote document store
        token: String,
        /// Existing remote document to use (discovered automatically if omitted)
        #[arg(long)]
        document_id: Option<String>,
    },
    /// Forget the stored token and return to local mode
    Logout,
    /// Pull the remote document and save it locally
    Sync,
    /// Save now, pushing to the remote document if sync is enabled
    Push,
    /// Show sync mode, storage and dataset summary
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Keep the engine running, refreshing periodically, until Ctrl-C
    Watch,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a task
    Add {
        /// Task text
        #[arg(required = true)]
        text: Vec<String>,
        /// Date (YYYY-MM-DD, default: today)
        #[arg(short, long, value_parser = parse_date)]
        date: Option<DateKey>,
    },
    /// List tasks
    #[command(alias = "ls")]
    List {
        /// Date (YYYY-MM-DD, default: today)
        #[arg(short, long, value_parser = parse_date, conflicts_with = "all")]
        date: Option<DateKey>,
        /// List every date that has tasks or a memo
        #[arg(short, long)]
        all: bool,
    },
    /// Toggle a task's completed flag
    Done {
        id: u64,
        /// Date of the task (searched if omitted)
        #[arg(short, long, value_parser = parse_date)]
        date: Option<DateKey>,
    },
    /// Replace a task's text
    Edit {
        id: u64,
        /// New text
        #[arg(required = true)]
        text: Vec<String>,
        #[arg(short, long, value_parser = parse_date)]
        date: Option<DateKey>,
    },
    /// Delete a task
    #[command(alias = "delete")]
    Rm {
        id: u64,
        #[arg(short, long, value_parser = parse_date)]
        date: Option<DateKey>,
    },
    /// Copy a task to the following day
    CopyNext {
        id: u64,
        #[arg(short, long, value_parser = parse_date)]
        date: Option<DateKey>,
    },
    /// Move a task to another task's position within the same day
    Move {
        id: u64,
        /// Task whose position to take
        #[arg(long)]
        onto: u64,
        #[arg(short, long, value_parser = parse_date)]
        date: Option<DateKey>,
    },
}

#[derive(Subcommand)]
enum DayCommands {
    /// Delete every task of a day
    Clear {
        #[arg(short, long, value_parser = parse_date)]
        date: Option<DateKey>,
    },
    /// Copy a day's tasks onto another day as new tasks
    Copy {
        #[arg(long, value_parser = parse_date)]
        from: DateKey,
        #[arg(long, value_parser = parse_date)]
        to: DateKey,
    },
}

#[derive(Subcommand)]
enum MemoCommands {
    /// Set the memo of a day
    Set {
        #[arg(required = true)]
        text: Vec<String>,
        #[arg(short, long, value_parser = parse_date)]
        date: Option<DateKey>,
    },
    /// Show the memo of a day
    Show {
        #[arg(short, long, value_parser = parse_date)]
        date: Option<DateKey>,
    },
    /// Remove the memo of a day
    Rm {
        #[arg(short, long, value_parser = parse_date)]
        date: Option<DateKey>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, remote_url, sync_enabled, log_file, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn parse_date(s: &str) -> Result<DateKey, String> {
    parse_date_key(s).map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn today() -> DateKey {
    chrono::Local::now().date_naive()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    let command = match cli.command {
        // Config commands work without opening the data directory
        Commands::Config { command } => {
            return match command {
                Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
                Some(ConfigCommands::Set { key, value }) => {
                    commands::config::set(key, value, config_path, &output)
                }
            };
        }
        other => other,
    };

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    if let Commands::Watch = command {
        logging::init_file_logging(&config);
        return commands::sync::watch(&config, &output).await;
    }
    logging::init_stderr_logging();

    let mut session = Session::open(&config)?;
    session.load_initial().await;

    match command {
        Commands::Task { command } => handle_task_command(command, &mut session, &output).await,
        Commands::Day { command } => handle_day_command(command, &mut session, &output).await,
        Commands::Memo { command } => handle_memo_command(command, &mut session, &output).await,
        Commands::Login { token, document_id } => {
            commands::sync::login(&mut session, token, document_id, &output).await
        }
        Commands::Logout => commands::sync::logout(&mut session, &output),
        Commands::Sync => commands::sync::sync(&mut session, &output).await,
        Commands::Push => commands::sync::push(&mut session, &output).await,
        Commands::Status => commands::status::show(&session, &config, &output),
        Commands::Config { .. } | Commands::Watch => unreachable!(), // Handled above
    }
}

async fn handle_task_command(
    command: TaskCommands,
    session: &mut Session,
    output: &Output,
) -> Result<()> {
    match command {
        TaskCommands::Add { text, date } => {
            commands::task::add(session, date.unwrap_or_else(today), text.join(" "), output).await
        }
        TaskCommands::List { date, all } => {
            if all {
                commands::task::list_all(session, output)
            } else {
                commands::task::list(session, date.unwrap_or_else(today), output)
            }
        }
        TaskCommands::Done { id, date } => commands::task::toggle(session, id, date, output).await,
        TaskCommands::Edit { id, text, date } => {
            commands::task::edit(session, id, date, text.join(" "), output).await
        }
        TaskCommands::Rm { id, date } => commands::task::delete(session, id, date, output).await,
        TaskCommands::CopyNext { id, date } => {
            commands::task::copy_next(session, id, date, output).await
        }
        TaskCommands::Move { id, onto, date } => {
            commands::task::reorder(session, id, onto, date, output).await
        }
    }
}

async fn handle_day_command(
    command: DayCommands,
    session: &mut Session,
    output: &Output,
) -> Result<()> {
    match command {
        DayCommands::Clear { date } => {
            commands::day::clear(session, date.unwrap_or_else(today), output).await
        }
        DayCommands::Copy { from, to } => commands::day::copy(session, from, to, output).await,
    }
}

async fn handle_memo_command(
    command: MemoCommands,
    session: &mut Session,
    output: &Output,
) -> Result<()> {
    match command {
        MemoCommands::Set { text, date } => {
            commands::memo::set(session, date.unwrap_or_else(today), text.join(" "), output).await
        }
        MemoCommands::Show { date } => {
            commands::memo::show(session, date.unwrap_or_else(today), output)
        }
        MemoCommands::Rm { date } => {
            commands::memo::set(session, date.unwrap_or_else(today), String::new(), output).await
        }
    }
}
