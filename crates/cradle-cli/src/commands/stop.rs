//! `cradle stop` — Stop a persistent container.

use clap::Args;
use cradle_common::config::CradleConfig;
use cradle_docker::host::DockerHost;
use cradle_docker::process::{CommandExecutor, SystemExecutor};

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container name to stop.
    pub name: String,
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the container cannot be stopped.
pub async fn execute(args: StopArgs) -> anyhow::Result<()> {
    let config = CradleConfig::from_env();
    let host = DockerHost::new(config.host);
    let command = host.docker_command(&format!("stop {}", args.name));
    let output = SystemExecutor.run(&command).await?;
    if !output.success() && !output.stderr.contains("No such container") {
        anyhow::bail!("failed to stop {}: {}", args.name, output.log());
    }
    tracing::info!(name = %args.name, "container stopped");
    Ok(())
}
