//! Volume requirements declared by environment components.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A volume that must be available inside the container.
///
/// Cache mounts are named, persist across builds, and are never baked into
/// image layers — the hosting platform owns their storage. Resolve mounts
/// bind a project directory whose host-side path is determined at
/// execution time via the storage resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountRequest {
    /// A named build-spanning persistent volume.
    Cache {
        /// Stable cache identity; reuse depends on it not changing.
        name: String,
        /// Mount point inside the container.
        container_path: PathBuf,
    },
    /// A project directory resolved lazily through the storage resolver.
    Resolve {
        /// Storage-resolver key of the directory.
        project_id: String,
        /// Mount point inside the container.
        container_path: PathBuf,
        /// Patterns excluded from synchronization.
        excludes: Vec<String>,
    },
}

impl MountRequest {
    /// A cache mount.
    #[must_use]
    pub fn cache(name: impl Into<String>, container_path: impl Into<PathBuf>) -> Self {
        Self::Cache {
            name: name.into(),
            container_path: container_path.into(),
        }
    }

    /// A resolve mount without exclusion patterns.
    #[must_use]
    pub fn resolve(project_id: impl Into<String>, container_path: impl Into<PathBuf>) -> Self {
        Self::Resolve {
            project_id: project_id.into(),
            container_path: container_path.into(),
            excludes: Vec::new(),
        }
    }

    /// Identity used for deduplication: the mount kind plus its name.
    #[must_use]
    pub fn dedup_key(&self) -> (MountKind, &str) {
        match self {
            Self::Cache { name, .. } => (MountKind::Cache, name),
            Self::Resolve { project_id, .. } => (MountKind::Resolve, project_id),
        }
    }

    /// The in-container mount point.
    #[must_use]
    pub fn container_path(&self) -> &PathBuf {
        match self {
            Self::Cache { container_path, .. } | Self::Resolve { container_path, .. } => {
                container_path
            }
        }
    }
}

/// Discriminant of a mount request, used as part of the dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountKind {
    /// Named persistent cache.
    Cache,
    /// Resolver-backed project directory.
    Resolve,
}
