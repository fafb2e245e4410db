//! Command routing logic for CLI

use std::process::ExitCode;

use anyhow::Result;

use crate::args::{Cli, Commands};
use crate::commands;

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Verify {
            log,
            interpreter,
            entry_point,
            timeout,
        } => commands::verify::execute(&log, interpreter, entry_point, timeout).await,
        Commands::Summary { log } => commands::summary::execute(&log).await,
        Commands::Tasks { selection } => commands::tasks::execute(selection).await,
    }
}
