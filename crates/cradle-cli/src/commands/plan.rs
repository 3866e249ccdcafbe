//! `cradle plan` — Compose and print the schematic without building.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Args;
use cradle_common::config::CradleConfig;
use cradle_schematic::catalog::universal_schematic;
use cradle_schematic::{MountRequest, ProjectDef, ProjectDir, ProjectKind};
use cradle_storage::StorageResolver;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Project id.
    pub id: String,

    /// Local path of the project directory.
    #[arg(long)]
    pub path: PathBuf,

    /// Project kind (auto, source, resource, uv, rye, setup.py,
    /// requirements.txt).
    #[arg(long, default_value = "auto")]
    pub kind: String,

    /// Base image override.
    #[arg(long)]
    pub base_image: Option<String>,
}

/// Executes the `plan` command.
///
/// # Errors
///
/// Returns an error if detection or assembly fails.
#[allow(clippy::print_stdout)]
pub async fn execute(args: PlanArgs) -> anyhow::Result<()> {
    let mut config = CradleConfig::from_env();
    if let Some(base_image) = args.base_image {
        config.base_image = base_image;
    }

    let kind = ProjectKind::from_str(&args.kind)?;
    let project = ProjectDef::new(vec![ProjectDir::new(&args.id, kind)]);
    let resolver = StorageResolver::from_map(HashMap::from([(args.id.clone(), args.path)]));

    let schematic = universal_schematic(&project, &config, &resolver).await?;

    println!("{}", schematic.dockerfile_preview());
    println!("# init commands");
    for command in &schematic.init_commands {
        println!("#   {command}");
    }
    println!("# mounts");
    for mount in &schematic.mounts {
        match mount {
            MountRequest::Cache { name, container_path } => {
                println!("#   cache   {name} -> {}", container_path.display());
            }
            MountRequest::Resolve { project_id, container_path, .. } => {
                println!("#   resolve {project_id} -> {}", container_path.display());
            }
        }
    }
    Ok(())
}
