//! The unit of environment composability.

use std::sync::Arc;

use crate::mounts::MountRequest;
use crate::step::BuildStep;

/// A named bundle of build steps, runtime init commands, mount requests,
/// and dependency components.
///
/// Components are pure value objects: constructed once, never mutated, and
/// shared by `Arc`. Dependencies are ordered; the assembler guarantees a
/// component's build steps never precede any dependency's steps. Component
/// identity in the dependency graph is the name.
#[derive(Debug)]
pub struct EnvComponent {
    /// Graph identity.
    pub name: String,
    /// Ordered build instructions contributed to the image.
    pub build_steps: Vec<BuildStep>,
    /// Ordered shell commands run inside the container before each script.
    pub init_commands: Vec<String>,
    /// Volumes this component requires.
    pub mounts: Vec<MountRequest>,
    /// Components that must be installed before this one.
    pub dependencies: Vec<Arc<EnvComponent>>,
}

impl EnvComponent {
    /// Starts building a component with the given graph identity.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder {
            component: Self {
                name: name.into(),
                build_steps: Vec::new(),
                init_commands: Vec::new(),
                mounts: Vec::new(),
                dependencies: Vec::new(),
            },
        }
    }
}

/// Accumulates the parts of an [`EnvComponent`] and freezes them into a
/// shared immutable value.
#[derive(Debug)]
pub struct ComponentBuilder {
    component: EnvComponent,
}

impl ComponentBuilder {
    /// Appends one build step.
    #[must_use]
    pub fn step(mut self, step: BuildStep) -> Self {
        self.component.build_steps.push(step);
        self
    }

    /// Appends raw Dockerfile lines in order.
    #[must_use]
    pub fn raw_steps<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.component
            .build_steps
            .extend(lines.into_iter().map(|l| BuildStep::Raw(l.into())));
        self
    }

    /// Appends one runtime init command.
    #[must_use]
    pub fn init(mut self, command: impl Into<String>) -> Self {
        self.component.init_commands.push(command.into());
        self
    }

    /// Appends one mount request.
    #[must_use]
    pub fn mount(mut self, mount: MountRequest) -> Self {
        self.component.mounts.push(mount);
        self
    }

    /// Declares a dependency that must be installed before this component.
    #[must_use]
    pub fn depends_on(mut self, dep: Arc<EnvComponent>) -> Self {
        self.component.dependencies.push(dep);
        self
    }

    /// Freezes the component.
    #[must_use]
    pub fn build(self) -> Arc<EnvComponent> {
        Arc::new(self.component)
    }
}
