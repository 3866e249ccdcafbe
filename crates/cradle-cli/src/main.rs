//! # cradle — environment composition and execution CLI
//!
//! Composes reproducible container environments for heterogeneous
//! projects and runs scripts inside them, locally or on a remote docker
//! host.

mod commands;

use clap::Parser;

use crate::commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    commands::execute(cli).await
}
