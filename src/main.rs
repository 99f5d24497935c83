//! Packsync CLI entry point.

use clap::Parser;

use packsync::cli::{Cli, CliContext, dispatch, handle_error};
use packsync::infrastructure::logging::LoggerImpl;

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let ctx = match CliContext::resolve(cli.project.as_deref(), cli.global) {
        Ok(ctx) => ctx,
        Err(err) => handle_error(&err, json),
    };
    let _logger = match LoggerImpl::init(&ctx.config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(&err, json),
    };

    if let Err(err) = dispatch(cli, &ctx) {
        handle_error(&err, json);
    }
}
