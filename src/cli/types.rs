//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line entry point.
#[derive(Parser, Debug)]
#[command(name = "packsync")]
#[command(about = "Converge pack contributions into your tool environment", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Project directory (defaults to the current directory)
    #[arg(short, long, global = true, env = "PACKSYNC_PROJECT")]
    pub project: Option<PathBuf>,

    /// Operate on the global scope instead of a project
    #[arg(short, long, global = true, conflicts_with = "project")]
    pub global: bool,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Converge the scope to the desired pack set
    Sync(SyncArgs),

    /// Pack management commands
    #[command(subcommand)]
    Pack(PackCommands),

    /// Show installed packs, versions and exclusions
    Status,

    /// Verify that recorded artifacts are still in place
    Check,
}

/// Arguments of `sync`.
#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Desired pack (repeatable). Without any, the installed set is re-converged
    #[arg(long = "pack", value_name = "ID")]
    pub packs: Vec<String>,

    /// Component to leave out, as PACK/COMPONENT (repeatable)
    #[arg(long, value_name = "PACK/COMPONENT")]
    pub exclude: Vec<String>,

    /// Forget previously stored exclusions
    #[arg(long)]
    pub reset_exclusions: bool,

    /// Shared run flags
    #[command(flatten)]
    pub run: RunArgs,
}

/// Flags shared by every command that mutates a scope.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct RunArgs {
    /// Compute and print the plan without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Accept name collisions without prompting
    #[arg(short, long)]
    pub yes: bool,
}

/// `pack` subcommands.
#[derive(Subcommand, Debug)]
pub enum PackCommands {
    /// Add packs to the scope and converge
    Add {
        /// Pack ids
        #[arg(required = true)]
        ids: Vec<String>,

        /// Component to leave out, as PACK/COMPONENT (repeatable)
        #[arg(long, value_name = "PACK/COMPONENT")]
        exclude: Vec<String>,

        /// Shared run flags
        #[command(flatten)]
        run: RunArgs,
    },

    /// Remove packs from the scope and converge
    Remove {
        /// Pack ids
        #[arg(required = true)]
        ids: Vec<String>,

        /// Shared run flags
        #[command(flatten)]
        run: RunArgs,
    },

    /// Re-apply installed packs from their current manifests
    Update {
        /// Pack ids (defaults to every installed pack)
        ids: Vec<String>,

        /// Shared run flags
        #[command(flatten)]
        run: RunArgs,
    },

    /// List available packs
    List,
}
