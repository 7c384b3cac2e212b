//! Netmon CLI - Replay and inspect recorded network activity
//!
//! Usage:
//!   netmon replay <CAPTURE>         Print the request list of a capture
//!   netmon resend <CAPTURE> <ID>    Edit and resend a captured request
//!   netmon convert <IN> <OUT>       Convert a capture between JSON and MessagePack
//!   netmon config                   Show saved preferences

mod commands;
mod config;
mod monitor;

use anyhow::Result;
use clap::{Parser, Subcommand};
use monitor::{FilterType, SortType};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "netmon")]
#[command(author = "Netmon Team")]
#[command(version)]
#[command(about = "Replay and inspect recorded network activity", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a capture and print the request list
    Replay {
        /// Capture file (.json, anything else is read as MessagePack)
        capture: PathBuf,

        /// Only show these request types (comma separated)
        #[arg(short, long = "filter", value_delimiter = ',')]
        filters: Vec<FilterType>,

        /// Show a single request type, ignoring saved filters
        #[arg(long, conflicts_with = "filters")]
        only: Option<FilterType>,

        /// Only show requests whose URL or method contains this text
        /// (prefix with '-' to exclude)
        #[arg(short, long, allow_hyphen_values = true)]
        search: Option<String>,

        /// Sort column
        #[arg(long)]
        sort: Option<SortType>,

        /// Sort in descending order
        #[arg(long, requires = "sort")]
        descending: bool,

        /// Commit every event immediately instead of batching
        #[arg(long)]
        sync: bool,

        /// Width of the request list (px)
        #[arg(long)]
        width: Option<f64>,

        /// Remember the active filters as the default
        #[arg(long)]
        save_filters: bool,
    },

    /// Edit a captured request and send it again
    Resend {
        /// Capture file
        capture: PathBuf,

        /// Id of the request to resend
        id: String,

        /// Override the method
        #[arg(short = 'X', long)]
        method: Option<String>,

        /// Override the URL
        #[arg(long)]
        url: Option<String>,

        /// Set a header (format: "Name: value"), repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Replace the request body
        #[arg(short = 'd', long)]
        body: Option<String>,

        /// Show the edited request without sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Convert a capture between JSON and MessagePack
    Convert {
        /// Capture to read
        input: PathBuf,

        /// Capture to write (format chosen by extension)
        output: PathBuf,
    },

    /// Show or change saved preferences
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the current configuration
    Show,

    /// Set the request types shown by default
    SetFilters {
        /// Request types (comma separated)
        #[arg(required = true, value_delimiter = ',')]
        filters: Vec<FilterType>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},netmon_cli=info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    match cli.command {
        Commands::Replay {
            capture,
            filters,
            only,
            search,
            sort,
            descending,
            sync,
            width,
            save_filters,
        } => {
            let opts = commands::replay::ReplayOptions {
                capture,
                filters,
                only,
                search,
                sort,
                descending,
                sync,
                width,
                save_filters,
            };
            commands::replay::run(opts).await?;
        }

        Commands::Resend {
            capture,
            id,
            method,
            url,
            headers,
            body,
            dry_run,
        } => {
            let opts = commands::resend::ResendOptions {
                capture,
                id,
                method,
                url,
                headers,
                body,
                dry_run,
            };
            commands::resend::run(opts).await?;
        }

        Commands::Convert { input, output } => {
            commands::convert::run(&input, &output)?;
        }

        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config::show()?,
            ConfigAction::SetFilters { filters } => commands::config::set_filters(filters)?,
        },
    }

    Ok(())
}
