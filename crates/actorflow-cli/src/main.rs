//! actorflow command line.
//!
//! Runs the reference pipelines on top of the reactor.
//!
//! # Quick Start
//!
//! ```bash
//! # Print every line sent to port 42042
//! actorflow sink --address 42042
//!
//! # Print only the lines that decode as bookmarks
//! actorflow sink --bookmarks --address 42042
//!
//! # Answer JSON bookmarks, one per line
//! actorflow reply --address 127.0.0.1:42042
//! echo '{"FirstUrl":"http://x","Text":"y"}' | nc 127.0.0.1 42042
//!
//! # Merge the lines of two ports
//! actorflow join --ports 42042 --ports 42043
//! ```

mod bookmark;
mod commands;
mod pipelines;
mod style;

use actorflow_config::ConfigLoader;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

/// actorflow - reactive line pipelines over TCP.
#[derive(Parser)]
#[command(name = "actorflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    /// Project directory holding actorflow.toml.
    #[arg(long, global = true, default_value = ".")]
    project: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Print every content line received on a port.
    Sink {
        /// Address to bind to (port only: 42042, or full: 127.0.0.1:42042).
        #[arg(short, long)]
        address: Option<String>,

        /// Decode lines as JSON bookmarks and print only those that decode.
        #[arg(long)]
        bookmarks: bool,
    },

    /// Decode JSON bookmarks and reply to each sender.
    Reply {
        /// Address to bind to (port only: 42042, or full: 127.0.0.1:42042).
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Merge the lines received on several ports.
    Join {
        /// Addresses to bind to. Defaults to pipelines.join_ports.
        #[arg(short, long = "ports", num_args = 1..)]
        ports: Vec<String>,
    },

    /// Show the effective configuration.
    Config {
        /// Output format (text, toml, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    let config = ConfigLoader::new()
        .with_project_dir(&cli.project)
        .load()
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Sink { address, bookmarks } => {
            commands::sink::run(&config, address.as_deref(), bookmarks)
        }
        Commands::Reply { address } => commands::reply::run(&config, address.as_deref()),
        Commands::Join { ports } => commands::join::run(&config, &ports),
        Commands::Config { format } => commands::config::show(&config, &format),
    }
}
