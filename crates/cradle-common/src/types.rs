//! Domain primitive types used across the Cradle workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque reference to a built container image (a tag).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef(String);

impl ImageRef {
    /// Creates an image reference from a tag string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the inner tag string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a persistent container, the identity of a persistent
/// environment handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerName(String);

impl ContainerName {
    /// Creates a container name from a string value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generates a random container name with the given prefix.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
        Self(format!("{prefix}-{suffix}"))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The docker-compatible endpoint that receives build and run operations.
///
/// Selection happens purely from configuration; schematics are
/// host-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HostTarget {
    /// The local docker daemon.
    #[default]
    Local,
    /// A named docker context (an indirection to another daemon endpoint).
    Context(String),
    /// A remote daemon reached over ssh; commands are wrapped in a remote
    /// shell invocation.
    Ssh(String),
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Context(name) => write!(f, "context:{name}"),
            Self::Ssh(host) => write!(f, "ssh:{host}"),
        }
    }
}

/// Structured result of a script execution inside a container.
///
/// A nonzero `exit_code` is a value, not an error: callers decide whether
/// it is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code of the script.
    pub exit_code: i32,
}

impl ScriptResult {
    /// Returns whether the script exited successfully.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Lifecycle state of a persistent container handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// No container exists for this handle yet.
    Unstarted,
    /// The named container is running.
    Running,
    /// The container was stopped and removed; the next script recreates it.
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unstarted => write!(f, "unstarted"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_ref_displays_tag() {
        let r = ImageRef::new("cradle/demo:latest");
        assert_eq!(r.to_string(), "cradle/demo:latest");
    }

    #[test]
    fn generated_container_names_are_prefixed_and_unique() {
        let a = ContainerName::generate("cradle");
        let b = ContainerName::generate("cradle");
        assert!(a.as_str().starts_with("cradle-"));
        assert_ne!(a, b);
    }

    #[test]
    fn host_target_default_is_local() {
        assert_eq!(HostTarget::default(), HostTarget::Local);
    }

    #[test]
    fn script_result_success_tracks_exit_code() {
        let ok = ScriptResult {
            stdout: "hello\n".into(),
            stderr: String::new(),
            exit_code: 0,
        };
        let failed = ScriptResult { exit_code: 3, ..ok.clone() };
        assert!(ok.success());
        assert!(!failed.success());
    }
}
