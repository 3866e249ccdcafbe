//! `cradle run` — Execute a script inside the project's environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use cradle_common::config::CradleConfig;
use cradle_common::types::{ContainerName, HostTarget};
use cradle_docker::host::DockerHost;
use cradle_docker::process::SystemExecutor;
use cradle_exec::{DockerEnv, PersistentEnv};
use cradle_schematic::catalog::universal_schematic;
use cradle_schematic::{ProjectDef, ProjectDir, ProjectKind};
use cradle_storage::StorageResolver;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Project id.
    pub id: String,

    /// Local path of the project directory.
    #[arg(long)]
    pub path: PathBuf,

    /// Project kind (auto, source, resource, uv, rye, setup.py,
    /// requirements.txt).
    #[arg(long, default_value = "auto")]
    pub kind: String,

    /// Script to execute.
    #[arg(short, long)]
    pub script: String,

    /// Reuse a named persistent container instead of a transient one.
    #[arg(long)]
    pub name: Option<String>,

    /// Kill the script after this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Executes the `run` command, exiting with the script's exit code.
///
/// # Errors
///
/// Returns an error if composition, build, sync, or transport fails; a
/// script-level nonzero exit is reported through the process exit code.
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let config = CradleConfig::from_env();
    if config.host == HostTarget::Local && !DockerHost::docker_available() {
        anyhow::bail!("no docker binary found in PATH");
    }
    let kind = ProjectKind::from_str(&args.kind)?;
    let project = ProjectDef::new(vec![ProjectDir::new(&args.id, kind)]);
    let resolver = Arc::new(StorageResolver::from_map(HashMap::from([(
        args.id.clone(),
        args.path.clone(),
    )])));
    let executor = Arc::new(SystemExecutor);

    let schematic = universal_schematic(&project, &config, &resolver).await?;
    let timeout = args.timeout.map(Duration::from_secs);

    let result = if let Some(name) = args.name {
        let env = PersistentEnv::new(
            project,
            schematic,
            &config,
            resolver,
            executor,
            ContainerName::new(name),
        );
        env.run_script_with_timeout(&args.script, timeout).await?
    } else {
        let env = DockerEnv::new(project, schematic, &config, resolver, executor);
        env.run_script_with_timeout(&args.script, timeout).await?
    };

    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    if !result.success() {
        tracing::warn!(code = result.exit_code, "script exited nonzero");
        std::process::exit(result.exit_code);
    }
    Ok(())
}
