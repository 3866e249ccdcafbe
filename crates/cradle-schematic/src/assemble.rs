//! Resolves a set of components into one buildable schematic.

use std::collections::HashMap;
use std::sync::Arc;

use cradle_common::error::{CradleError, Result};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::component::EnvComponent;
use crate::graph::DependencyGraph;
use crate::mounts::{MountKind, MountRequest};
use crate::step::BuildStep;

/// The fully assembled, host-agnostic description of a container build:
/// ordered build steps, runtime init commands, and deduplicated mounts.
///
/// Created once per (project, options) pair and consumed by both the image
/// builder and the execution environments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSchematic {
    /// Image the build starts from.
    pub base_image: String,
    /// Dependency-first ordered build instructions.
    pub build_steps: Vec<BuildStep>,
    /// Shell commands run inside the container before each script.
    pub init_commands: Vec<String>,
    /// Deduplicated mount requests.
    pub mounts: Vec<MountRequest>,
}

impl ContainerSchematic {
    /// Creates an empty schematic rooted at `base_image`.
    #[must_use]
    pub fn new(base_image: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
            build_steps: Vec::new(),
            init_commands: Vec::new(),
            mounts: Vec::new(),
        }
    }

    /// Returns a copy with one build step appended.
    #[must_use]
    pub fn with_step(mut self, step: BuildStep) -> Self {
        self.build_steps.push(step);
        self
    }

    /// Returns a copy with one init command appended.
    #[must_use]
    pub fn with_init(mut self, command: impl Into<String>) -> Self {
        self.init_commands.push(command.into());
        self
    }

    /// Returns a copy with one mount request appended.
    ///
    /// Mount invariants are enforced at assembly; later additions are the
    /// caller's responsibility.
    #[must_use]
    pub fn with_mount(mut self, mount: MountRequest) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Renders the Dockerfile this schematic builds, with staged payloads
    /// referenced by their context names.
    #[must_use]
    pub fn dockerfile_preview(&self) -> String {
        let mut out = format!("FROM {} AS base\n", self.base_image);
        for step in &self.build_steps {
            out.push_str(&step.dockerfile_line());
            out.push('\n');
        }
        out
    }
}

/// Assembles the supplied components and their transitive dependencies
/// into a single schematic.
///
/// Ordering is dependency-first: a component's build steps never precede
/// any dependency's steps, and components the graph leaves unconstrained
/// keep the caller's supplied order. Mounts are deduplicated by
/// (kind, name) preserving the first-seen container path.
///
/// # Errors
///
/// Returns [`CradleError::CyclicDependency`] if the component graph has a
/// cycle, or [`CradleError::ConflictingMount`] if one cache name maps to
/// two container paths.
pub fn assemble(
    base_image: impl Into<String>,
    components: &[Arc<EnvComponent>],
) -> Result<ContainerSchematic> {
    let mut graph = DependencyGraph::new();
    let mut registry: HashMap<String, Arc<EnvComponent>> = HashMap::new();
    for component in components {
        let _ = register(&mut graph, &mut registry, component);
    }

    let order = graph.resolve_order()?;
    tracing::debug!(?order, "assembly order resolved");

    let mut schematic = ContainerSchematic::new(base_image);
    let mut raw_mounts = Vec::new();
    for name in &order {
        if let Some(component) = registry.get(name) {
            schematic.build_steps.extend(component.build_steps.iter().cloned());
            schematic
                .init_commands
                .extend(component.init_commands.iter().cloned());
            raw_mounts.extend(component.mounts.iter().cloned());
        }
    }
    schematic.mounts = dedup_mounts(raw_mounts)?;
    Ok(schematic)
}

/// Registers a component and its transitive dependencies, pre-order, and
/// records dependency edges. The first definition seen under a name wins.
fn register(
    graph: &mut DependencyGraph,
    registry: &mut HashMap<String, Arc<EnvComponent>>,
    component: &Arc<EnvComponent>,
) -> NodeIndex {
    let idx = graph.add_component(&component.name);
    if registry.contains_key(&component.name) {
        return idx;
    }
    let _ = registry.insert(component.name.clone(), Arc::clone(component));
    for dep in &component.dependencies {
        let dep_idx = register(graph, registry, dep);
        graph.add_dependency(idx, dep_idx);
    }
    idx
}

fn dedup_mounts(mounts: Vec<MountRequest>) -> Result<Vec<MountRequest>> {
    let mut seen: HashMap<(MountKind, String), std::path::PathBuf> = HashMap::new();
    let mut out = Vec::new();
    for mount in mounts {
        let (kind, name) = mount.dedup_key();
        let key = (kind, name.to_owned());
        if let Some(first) = seen.get(&key) {
            if first != mount.container_path() && kind == MountKind::Cache {
                return Err(CradleError::ConflictingMount {
                    name: key.1,
                    first: first.clone(),
                    second: mount.container_path().clone(),
                });
            }
            // Duplicates collapse; resolve mounts keep the first-seen path.
        } else {
            let _ = seen.insert(key, mount.container_path().clone());
            out.push(mount);
        }
    }
    Ok(out)
}
