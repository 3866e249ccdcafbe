//! Sidecar metadata files for the metadata-scan resolver.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cradle_common::constants::STORAGE_SIDECAR;
use cradle_common::error::{CradleError, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// Contents of a `.cradle-storage.yaml` sidecar file.
///
/// The declared directory is the sidecar's parent, optionally offset by a
/// relative `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSidecar {
    /// Logical project id this directory answers to.
    pub id: String,
    /// Optional path relative to the sidecar's directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Recursively scans `roots` for sidecar files and returns the resulting
/// id-to-path index.
///
/// Runs on the blocking pool since directory walking is synchronous I/O.
///
/// # Errors
///
/// Returns an error if a sidecar file cannot be read or parsed; unreadable
/// directories are skipped.
pub(crate) async fn scan_roots(roots: Vec<PathBuf>) -> Result<HashMap<String, PathBuf>> {
    tokio::task::spawn_blocking(move || {
        let mut index = HashMap::new();
        for root in &roots {
            scan_root(root, &mut index)?;
        }
        Ok(index)
    })
    .await
    .map_err(|e| CradleError::Transport {
        op: "metadata scan".to_owned(),
        detail: e.to_string(),
    })?
}

fn scan_root(root: &Path, index: &mut HashMap<String, PathBuf>) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false).into_iter().filter_map(std::result::Result::ok) {
        if entry.file_type().is_file() && entry.file_name() == STORAGE_SIDECAR {
            let sidecar = read_sidecar(entry.path())?;
            let base = entry.path().parent().unwrap_or(root);
            let resolved = match &sidecar.path {
                Some(rel) => base.join(rel),
                None => base.to_path_buf(),
            };
            tracing::debug!(id = %sidecar.id, path = %resolved.display(), "registered storage item");
            let _ = index.insert(sidecar.id, resolved);
        }
    }
    Ok(())
}

fn read_sidecar(path: &Path) -> Result<StorageSidecar> {
    let text = std::fs::read_to_string(path).map_err(|e| CradleError::io(path, e))?;
    serde_yaml::from_str(&text).map_err(|e| CradleError::Metadata {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_finds_sidecars_recursively() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("group").join("proj");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(nested.join(STORAGE_SIDECAR), "id: demo\n").expect("write");

        let index = scan_roots(vec![dir.path().to_path_buf()]).await.expect("scan");
        assert_eq!(index.get("demo"), Some(&nested));
    }

    #[tokio::test]
    async fn sidecar_relative_path_offsets_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let proj = dir.path().join("proj");
        std::fs::create_dir_all(proj.join("data")).expect("mkdir");
        std::fs::write(proj.join(STORAGE_SIDECAR), "id: demo\npath: data\n").expect("write");

        let index = scan_roots(vec![dir.path().to_path_buf()]).await.expect("scan");
        assert_eq!(index.get("demo"), Some(&proj.join("data")));
    }

    #[tokio::test]
    async fn malformed_sidecar_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(STORAGE_SIDECAR), ": not yaml :\n").expect("write");

        let err = scan_roots(vec![dir.path().to_path_buf()]).await.unwrap_err();
        assert!(matches!(err, CradleError::Metadata { .. }));
    }
}
