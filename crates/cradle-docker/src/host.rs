//! Docker command construction per host target.
//!
//! A [`DockerHost`] turns abstract operations into the concrete command
//! strings for its endpoint: plain `docker` for the local daemon,
//! `docker --context <name>` for a named context, and an `ssh`-wrapped
//! invocation for a remote daemon. Host selection comes purely from
//! configuration; schematics never carry it.

use std::path::Path;

use cradle_common::types::HostTarget;

/// A docker-compatible endpoint plus the command plumbing to reach it.
#[derive(Debug, Clone)]
pub struct DockerHost {
    target: HostTarget,
}

impl DockerHost {
    /// Creates a host wrapper for the given target.
    #[must_use]
    pub const fn new(target: HostTarget) -> Self {
        Self { target }
    }

    /// The configured target.
    #[must_use]
    pub const fn target(&self) -> &HostTarget {
        &self.target
    }

    /// Whether file synchronization must cross a machine boundary.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self.target, HostTarget::Ssh(_))
    }

    /// The ssh host name, when the target is ssh-addressed.
    #[must_use]
    pub fn ssh_host(&self) -> Option<&str> {
        match &self.target {
            HostTarget::Ssh(host) => Some(host),
            HostTarget::Local | HostTarget::Context(_) => None,
        }
    }

    /// Whether a docker binary is reachable from this process.
    #[must_use]
    pub fn docker_available() -> bool {
        which::which("docker").is_ok()
    }

    /// Builds the full shell command for a docker invocation, e.g.
    /// `docker_command("ps -a")` → `docker --context zeus ps -a`.
    #[must_use]
    pub fn docker_command(&self, args: &str) -> String {
        match &self.target {
            HostTarget::Local => format!("docker {args}"),
            HostTarget::Context(name) => format!("docker --context {name} {args}"),
            HostTarget::Ssh(_) => self.shell_command(&format!("docker {args}")),
        }
    }

    /// Builds a shell command that runs on the execution host: unchanged
    /// locally and for named contexts, ssh-wrapped for remote daemons.
    #[must_use]
    pub fn shell_command(&self, command: &str) -> String {
        match &self.target {
            HostTarget::Local | HostTarget::Context(_) => command.to_owned(),
            HostTarget::Ssh(host) => {
                let quoted = command.replace('\'', r"'\''");
                format!("ssh {host} '{quoted}'")
            }
        }
    }

    /// Destination argument for rsync: `host:path` for remote targets,
    /// the plain path otherwise.
    #[must_use]
    pub fn sync_destination(&self, path: &Path) -> String {
        match &self.target {
            HostTarget::Local | HostTarget::Context(_) => path.display().to_string(),
            HostTarget::Ssh(host) => format!("{host}:{}", path.display()),
        }
    }
}
