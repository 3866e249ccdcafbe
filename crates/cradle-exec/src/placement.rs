//! Host-side placement of caches and synchronized directories.

use std::path::{Path, PathBuf};

use cradle_common::constants::DEFAULT_HOST_ROOT;

/// Where the execution host keeps cache volumes and synchronized project
/// directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlacement {
    /// Root for named cache volumes.
    pub cache_root: PathBuf,
    /// Root for synchronized source directories.
    pub source_root: PathBuf,
    /// Root for synchronized resource directories.
    pub resource_root: PathBuf,
}

impl HostPlacement {
    /// Derives the standard layout under one root directory.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self {
            cache_root: root.join("cache"),
            source_root: root.join("sources"),
            resource_root: root.join("resources"),
        }
    }
}

impl Default for HostPlacement {
    fn default() -> Self {
        Self::under(Path::new(DEFAULT_HOST_ROOT))
    }
}
