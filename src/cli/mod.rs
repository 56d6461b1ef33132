//! CLI command implementations

use clap::{Parser, Subcommand};

pub mod error;
pub mod fetch;
pub mod status;

pub use error::CliError;
pub use fetch::FetchArgs;
pub use status::StatusArgs;

/// Archive a Gmail mailbox to local disk
#[derive(Parser, Debug)]
#[command(name = "mailbox-archiver", version, about, long_about = None)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every message matching a query
    Fetch(FetchArgs),

    /// Show the progress of a running or finished download
    Status(StatusArgs),
}
