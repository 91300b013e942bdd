//! CLI command definitions for the `stier` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod config;
pub mod session;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Inspect and edit session state.
#[derive(Parser)]
#[command(name = "stier", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all log output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true, env = "SESSIONTIER_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the current state of a subject.
    Get {
        subject: String,
    },

    /// Replace (or with --merge, extend) the state of a subject.
    Set {
        subject: String,

        /// JSON object.
        state: String,

        /// Merge the given fields into the existing state.
        #[arg(long)]
        merge: bool,
    },

    /// Reset a subject to its retained fields.
    Reset {
        subject: String,
    },

    /// Apply cleanup rules for a workflow transition event.
    Transition {
        subject: String,
        event: String,
    },

    /// Show the fast-path identity projection of a subject.
    Peek {
        subject: String,
    },

    /// List the most recently persisted subjects.
    #[command(alias = "ls")]
    List {
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: u32,
    },

    /// Print the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        shell: Shell,
    },
}
