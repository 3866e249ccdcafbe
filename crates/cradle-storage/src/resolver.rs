//! Resolver variants and the `+` composition operator.

use std::collections::HashMap;
use std::ops::Add;
use std::path::PathBuf;

use cradle_common::error::{CradleError, Result};
use tokio::sync::RwLock;

use crate::metadata;

/// Maps logical project ids to filesystem paths.
///
/// Construct one of the variants and compose with `+`; priority follows
/// composition order (left wins). The composition is associative —
/// `(a + b) + c` and `a + (b + c)` resolve every id identically.
#[derive(Debug)]
pub struct StorageResolver {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    /// Fixed mapping supplied at construction; `sync` is a no-op.
    Static(HashMap<String, PathBuf>),
    /// Each immediate subdirectory of `root` is an id-to-path entry.
    DirectoryScan {
        root: PathBuf,
        index: RwLock<Option<HashMap<String, PathBuf>>>,
    },
    /// Recursive scan for sidecar metadata files under the given roots.
    MetadataScan {
        roots: Vec<PathBuf>,
        index: RwLock<Option<HashMap<String, PathBuf>>>,
    },
    /// Ordered fallback chain; flattened at construction so children are
    /// always leaf variants.
    Combined(Vec<StorageResolver>),
}

impl StorageResolver {
    /// Creates a resolver over a fixed id-to-path map.
    #[must_use]
    pub fn from_map(map: HashMap<String, PathBuf>) -> Self {
        Self { inner: Inner::Static(map) }
    }

    /// Creates a resolver that treats each immediate subdirectory of
    /// `root` as a project directory named by the subdirectory.
    #[must_use]
    pub fn scan_directory(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Inner::DirectoryScan {
                root: root.into(),
                index: RwLock::new(None),
            },
        }
    }

    /// Creates a resolver that recursively scans `roots` for sidecar
    /// metadata files declaring project ids.
    #[must_use]
    pub fn scan_metadata(roots: Vec<PathBuf>) -> Self {
        Self {
            inner: Inner::MetadataScan {
                roots,
                index: RwLock::new(None),
            },
        }
    }

    /// Creates an ordered fallback chain over the given resolvers.
    ///
    /// A chain with zero children is valid and fails every lookup.
    #[must_use]
    pub fn combined(resolvers: Vec<Self>) -> Self {
        let mut flat = Vec::with_capacity(resolvers.len());
        for r in resolvers {
            match r.inner {
                Inner::Combined(children) => flat.extend(children),
                _ => flat.push(r),
            }
        }
        Self { inner: Inner::Combined(flat) }
    }

    /// Resolves a project id to a filesystem path.
    ///
    /// Scan-backed variants populate their index on first use. Combined
    /// chains try children in order and return the first success.
    ///
    /// # Errors
    ///
    /// Returns [`CradleError::UnknownId`] if no backing store knows `id`;
    /// scan failures (I/O, malformed sidecars) propagate as-is rather than
    /// being treated as a miss.
    pub async fn locate(&self, id: &str) -> Result<PathBuf> {
        match &self.inner {
            Inner::Combined(children) => {
                for child in children {
                    match child.locate_leaf(id).await {
                        Ok(path) => return Ok(path),
                        Err(CradleError::UnknownId { .. }) => {}
                        Err(other) => return Err(other),
                    }
                }
                Err(CradleError::UnknownId { id: id.to_owned() })
            }
            _ => self.locate_leaf(id).await,
        }
    }

    /// Refreshes the id-to-path index from the backing store.
    ///
    /// Idempotent and safe to call repeatedly. Combined chains sync every
    /// child; child order does not matter since each owns disjoint state.
    ///
    /// # Errors
    ///
    /// Returns an error if a backing store cannot be read.
    pub async fn sync(&self) -> Result<()> {
        match &self.inner {
            Inner::Combined(children) => {
                for child in children {
                    child.sync_leaf().await?;
                }
                Ok(())
            }
            _ => self.sync_leaf().await,
        }
    }

    async fn locate_leaf(&self, id: &str) -> Result<PathBuf> {
        match &self.inner {
            Inner::Static(map) => map
                .get(id)
                .cloned()
                .ok_or_else(|| CradleError::UnknownId { id: id.to_owned() }),
            Inner::DirectoryScan { index, .. } | Inner::MetadataScan { index, .. } => {
                if index.read().await.is_none() {
                    self.sync_leaf().await?;
                }
                index
                    .read()
                    .await
                    .as_ref()
                    .and_then(|m| m.get(id).cloned())
                    .ok_or_else(|| CradleError::UnknownId { id: id.to_owned() })
            }
            // Flattened at construction; a combined chain never nests.
            Inner::Combined(_) => Err(CradleError::UnknownId { id: id.to_owned() }),
        }
    }

    async fn sync_leaf(&self) -> Result<()> {
        match &self.inner {
            Inner::Static(_) | Inner::Combined(_) => Ok(()),
            Inner::DirectoryScan { root, index } => {
                let fresh = list_subdirectories(root).await?;
                tracing::debug!(root = %root.display(), entries = fresh.len(), "directory scan");
                *index.write().await = Some(fresh);
                Ok(())
            }
            Inner::MetadataScan { roots, index } => {
                let fresh = metadata::scan_roots(roots.clone()).await?;
                tracing::debug!(roots = roots.len(), entries = fresh.len(), "metadata scan");
                *index.write().await = Some(fresh);
                Ok(())
            }
        }
    }
}

impl Add for StorageResolver {
    type Output = Self;

    /// Chains two resolvers; the left-hand side takes priority.
    fn add(self, rhs: Self) -> Self {
        Self::combined(vec![self, rhs])
    }
}

async fn list_subdirectories(root: &PathBuf) -> Result<HashMap<String, PathBuf>> {
    let mut entries = tokio::fs::read_dir(root)
        .await
        .map_err(|e| CradleError::io(root.clone(), e))?;
    let mut map = HashMap::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CradleError::io(root.clone(), e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map_err(|e| CradleError::io(entry.path(), e))?
            .is_dir();
        if is_dir {
            let _ = map.insert(entry.file_name().to_string_lossy().into_owned(), entry.path());
        }
    }
    Ok(map)
}
