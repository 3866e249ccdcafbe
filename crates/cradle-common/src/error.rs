//! Unified error types for the Cradle workspace.
//!
//! The taxonomy mirrors how failures are handled: composition and
//! resolution errors are detected before any external process runs and are
//! never retried; build and sync errors carry the captured log of the
//! failing invocation; transport errors are kept distinct from script-level
//! failures so retries can target only the control plane. A script exiting
//! nonzero is *not* an error — it is returned as a
//! [`ScriptResult`](crate::types::ScriptResult) for the caller to inspect.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CradleError {
    /// The component dependency graph contains a cycle.
    #[error("cyclic dependency between components: {}", members.join(" -> "))]
    CyclicDependency {
        /// Names of the components participating in the cycle.
        members: Vec<String>,
    },

    /// Two cache mounts share a name but disagree on the container path.
    #[error("cache mount '{name}' declared at both {} and {}", first.display(), second.display())]
    ConflictingMount {
        /// Cache mount name.
        name: String,
        /// Container path seen first.
        first: PathBuf,
        /// Conflicting container path seen later.
        second: PathBuf,
    },

    /// A project kind literal is not recognized.
    #[error("unsupported project kind: {kind}")]
    UnsupportedKind {
        /// The offending kind literal.
        kind: String,
    },

    /// A storage resolver could not locate a project id.
    #[error("could not locate project id: {id}")]
    UnknownId {
        /// The id that failed to resolve.
        id: String,
    },

    /// An image build exited nonzero.
    #[error("image build failed for {tag}:\n{log}")]
    BuildFailed {
        /// Tag the build was targeting.
        tag: String,
        /// Captured build log (stdout + stderr).
        log: String,
    },

    /// A file synchronization transfer exited nonzero.
    #[error("sync failed from {src} to {dst}:\n{log}")]
    SyncFailed {
        /// Source location.
        src: String,
        /// Destination location.
        dst: String,
        /// Captured transfer log.
        log: String,
    },

    /// The docker/ssh control plane could not be reached or rejected the
    /// operation before the user workload ran.
    #[error("transport failure during {op}: {detail}")]
    Transport {
        /// Operation that was being attempted.
        op: String,
        /// Captured diagnostic detail.
        detail: String,
    },

    /// A script execution exceeded its caller-supplied deadline.
    #[error("script timed out after {seconds}s")]
    Timeout {
        /// The deadline that elapsed.
        seconds: u64,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A storage sidecar metadata file could not be parsed.
    #[error("invalid storage metadata at {path}: {detail}")]
    Metadata {
        /// Path of the offending sidecar file.
        path: PathBuf,
        /// Parse error description.
        detail: String,
    },
}

impl CradleError {
    /// Wraps an I/O error with the path it occurred at.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns whether this failure originated in the control plane rather
    /// than in the user's workload, i.e. whether a retry could help.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CradleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_members_in_order() {
        let err = CradleError::CyclicDependency {
            members: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "cyclic dependency between components: a -> b -> a"
        );
    }

    #[test]
    fn unknown_id_names_the_offender() {
        let err = CradleError::UnknownId { id: "missing".into() };
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn transport_is_distinguishable() {
        let transport = CradleError::Transport {
            op: "docker ps".into(),
            detail: "connection refused".into(),
        };
        let build = CradleError::BuildFailed {
            tag: "t".into(),
            log: String::new(),
        };
        assert!(transport.is_transport());
        assert!(!build.is_transport());
    }
}
