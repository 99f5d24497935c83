//! Command-line interface.

pub mod commands;
pub mod context;
pub mod output;
pub mod types;

pub use context::CliContext;
pub use types::{Cli, Commands, PackCommands, RunArgs, SyncArgs};

use crate::domain::errors::DomainError;

/// Run a parsed command against a resolved context.
pub fn dispatch(cli: Cli, ctx: &CliContext) -> anyhow::Result<()> {
    match cli.command {
        Commands::Sync(args) => commands::sync::execute(args, ctx, cli.json),
        Commands::Pack(command) => commands::pack::execute(command, ctx, cli.json),
        Commands::Status => commands::status::execute(ctx, cli.json),
        Commands::Check => commands::check::execute(ctx, cli.json),
    }
}

/// Stable machine-readable code for an error chain.
pub fn error_code(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<DomainError>() {
        Some(DomainError::CorruptState { .. }) => "corrupt_state",
        Some(DomainError::Validation { .. }) => "validation",
        Some(DomainError::UnknownPack(_)) => "unknown_pack",
        Some(DomainError::CollisionsDeclined { .. }) => "collisions_declined",
        Some(DomainError::LockHeld { .. }) => "lock_held",
        Some(DomainError::Io { .. }) => "io",
        Some(DomainError::Serialization(_)) => "serialization",
        None => "error",
    }
}

/// Print an error (human or JSON) and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "error": {
                "code": error_code(err),
                "message": err.to_string(),
                "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
            }
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    std::process::exit(1);
}
