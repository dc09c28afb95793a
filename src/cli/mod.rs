//! CLI argument definitions for Workboard.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Workboard - A dashboard backend over Azure DevOps work items.
///
/// Run `wb serve` for the HTTP API, or query the tracker directly with
/// `wb tree`, `wb items` and friends.
#[derive(Parser, Debug)]
#[command(name = "wb")]
#[command(author, version, about = "Resolve and serve Azure DevOps work item hierarchies", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Serve work items from a JSON fixture instead of the remote tracker
    #[arg(long, global = true, env = "WB_FIXTURE", value_name = "FILE")]
    pub fixture: Option<PathBuf>,

    /// Organization (overrides ADO_ORG and config.kdl)
    #[arg(long = "org", global = true)]
    pub organization: Option<String>,

    /// Project (overrides ADO_PROJECT and config.kdl)
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Default team for iteration lookups (overrides ADO_TEAM and config.kdl)
    #[arg(long, global = true)]
    pub team: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host address to bind to (use 0.0.0.0 for network access)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default: 3001, or PORT env var)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Resolve an iteration's items plus all their ancestors
    Tree {
        /// Iteration path (e.g. "Project\\Sprint 4")
        iteration: String,

        /// Only items assigned to this person
        #[arg(long)]
        assigned_to: Option<String>,
    },

    /// List work items by type, or the items of one iteration
    Items {
        /// Work item type, or "All" for Epic, Feature, User Story and Task
        #[arg(short = 't', long = "type")]
        work_item_type: Option<String>,

        /// Restrict to an iteration path
        #[arg(long)]
        iteration: Option<String>,

        /// Only items assigned to this person (with --iteration)
        #[arg(long, requires = "iteration")]
        assigned_to: Option<String>,
    },

    /// Fetch work items by id
    Fetch {
        /// Work item ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List the direct children of a work item
    Children {
        /// Parent work item id
        id: String,
    },

    /// Search work item titles (a numeric query looks up that id)
    Search {
        /// Text to search for
        query: String,

        /// Restrict to one work item type
        #[arg(short = 't', long = "type")]
        work_item_type: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show version information
    Version,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved settings and where each value came from
    Show,

    /// Set a value in config.kdl (or state.kdl for `pat`)
    Set {
        /// Configuration key (organization, project, team, host, port,
        /// api-version, request-timeout-secs, fetch-concurrency, pat)
        key: String,
        /// Configuration value
        value: String,
    },
}
