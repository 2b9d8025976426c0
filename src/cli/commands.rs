use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::ledger::InfringementInput;

#[derive(Parser)]
#[command(name = "kart-steward")]
#[command(author, version, about = "Infringement and penalty tracker for kart race sessions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Data directory holding the control database and session namespaces
    #[arg(long, global = true, env = "STEWARD_DATA_DIR", default_value = "steward-data")]
    pub data_dir: PathBuf,
}

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage race sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Record a new infringement in the active session
    Record(InfringementArgs),

    /// Amend an existing infringement
    Amend {
        /// Infringement ID
        id: i64,

        #[command(flatten)]
        args: InfringementArgs,
    },

    /// Remove an infringement
    Remove {
        /// Infringement ID
        id: i64,

        /// Who is removing it
        #[arg(long, default_value = "system")]
        by: String,
    },

    /// Apply or inspect penalties
    Penalty {
        #[command(subcommand)]
        action: PenaltyAction,
    },

    /// List infringements of the active session, newest first
    List {
        /// Page number (1-based). Omit to list everything
        #[arg(long)]
        page: Option<u32>,

        /// Page size
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Show the audit history of a kart
    History {
        /// Kart number
        kart: i64,
    },

    /// Manage rule settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a new session and make it active
    Start { name: String },
    /// Load an existing session and make it active
    Load { name: String },
    /// Mark a session closed
    Close { name: String },
    /// Delete a session and all of its data
    Delete { name: String },
    /// List sessions, most recent first
    List,
    /// Show the active session
    Active,
    /// Export a session to a JSON snapshot
    Export { name: String },
    /// Import a JSON snapshot as a new session
    Import {
        /// Snapshot file
        path: PathBuf,

        /// Import under a different session name
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum PenaltyAction {
    /// Serve the pending penalty of one infringement
    Apply {
        /// Infringement ID
        id: i64,

        #[arg(long, default_value = "system")]
        by: String,
    },
    /// Serve every pending penalty of a kart
    ApplyAll {
        /// Kart number
        kart: i64,

        #[arg(long, default_value = "system")]
        by: String,
    },
    /// List outstanding penalties, oldest first
    Pending,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the warning expiry window in minutes
    GetExpiry,
    /// Set the warning expiry window in minutes
    SetExpiry { minutes: i64 },
}

#[derive(Args, Debug, Clone)]
pub struct InfringementArgs {
    /// Kart number
    #[arg(long)]
    pub kart: i64,

    /// Infringement description
    #[arg(long)]
    pub description: String,

    /// Turn or track location
    #[arg(long)]
    pub turn: Option<String>,

    /// Marshal who observed it
    #[arg(long)]
    pub observer: Option<String>,

    /// Explicit penalty decision, e.g. "Drive through" or "No further action"
    #[arg(long)]
    pub penalty: Option<String>,

    /// Who is recording it
    #[arg(long, default_value = "system")]
    pub by: String,
}

impl From<InfringementArgs> for InfringementInput {
    fn from(args: InfringementArgs) -> Self {
        Self {
            kart_number: args.kart,
            turn_number: args.turn,
            description: args.description,
            observer: args.observer,
            penalty_description: args.penalty,
            performed_by: args.by,
        }
    }
}
