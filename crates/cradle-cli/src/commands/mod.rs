//! CLI command definitions and dispatch.

pub mod plan;
pub mod run;
pub mod stop;

use clap::{Parser, Subcommand};

/// Cradle — reproducible container environments for heterogeneous
/// projects.
#[derive(Parser, Debug)]
#[command(name = "cradle", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect the project flavor and print the composed schematic.
    Plan(plan::PlanArgs),
    /// Run a script inside the project's environment.
    Run(run::RunArgs),
    /// Stop a persistent container.
    Stop(stop::StopArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Plan(args) => plan::execute(args).await,
        Command::Run(args) => run::execute(args).await,
        Command::Stop(args) => stop::execute(args).await,
    }
}
