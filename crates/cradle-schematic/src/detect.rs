//! Project-kind detection over a resolved project directory.
//!
//! Multiple marker files commonly coexist (a uv project usually also has a
//! `pyproject.toml` that would match the generic probe), so the probe
//! order below is a hard contract, not an optimization: only the first
//! matching probe fires.

use std::fmt;
use std::path::Path;

use cradle_common::error::{CradleError, Result};

use crate::project::ProjectKind;

/// Environment flavor tags produced by detection, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvTag {
    /// uv-managed python environment.
    Uv,
    /// rye-managed python environment.
    Rye,
    /// Generic `pyproject.toml` without a uv/rye marker.
    Poetry,
    /// pyenv-provisioned python interpreter and virtualenv.
    PyVenv,
    /// Editable install via `setup.py`.
    SetupPy,
    /// Install from `requirements.txt`.
    Requirements,
}

impl fmt::Display for EnvTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uv => "uv",
            Self::Rye => "rye",
            Self::Poetry => "poetry",
            Self::PyVenv => "pyvenv",
            Self::SetupPy => "setup.py",
            Self::Requirements => "requirements.txt",
        };
        write!(f, "{s}")
    }
}

/// Maps an explicit project kind to its fixed one-element tag sequence,
/// or probes the resolved directory when the kind is `Auto`.
///
/// Explicit kinds never touch the filesystem. The catalog pulls the
/// interpreter layer in as a component dependency, so the single-tag and
/// probed sequences assemble identically.
///
/// # Errors
///
/// Returns an error if a marker file exists but cannot be read.
pub async fn detect(kind: ProjectKind, resolved_path: &Path) -> Result<Vec<EnvTag>> {
    match kind {
        ProjectKind::Auto => probe_dir(resolved_path).await,
        ProjectKind::Source | ProjectKind::Resource => Ok(Vec::new()),
        ProjectKind::Uv => Ok(vec![EnvTag::Uv]),
        ProjectKind::Rye => Ok(vec![EnvTag::Rye]),
        ProjectKind::SetupPy => Ok(vec![EnvTag::SetupPy]),
        ProjectKind::Requirements => Ok(vec![EnvTag::Requirements]),
    }
}

/// Applies the file-existence probes in fixed priority order:
/// uv-marked `pyproject.toml`, rye-marked `pyproject.toml`, generic
/// `pyproject.toml`, `setup.py`, `requirements.txt`, plain source.
///
/// # Errors
///
/// Returns an error if a marker file exists but cannot be read.
pub async fn probe_dir(path: &Path) -> Result<Vec<EnvTag>> {
    let pyproject = path.join("pyproject.toml");
    if pyproject.is_file() {
        let text = tokio::fs::read_to_string(&pyproject)
            .await
            .map_err(|e| CradleError::io(&pyproject, e))?;
        if text.contains("[tool.uv]") || text.contains("[tool.uv.") {
            tracing::debug!(path = %path.display(), "detected uv project");
            return Ok(vec![EnvTag::Uv]);
        }
        if text.contains("[tool.rye]") || text.contains("[tool.rye.") {
            tracing::debug!(path = %path.display(), "detected rye project");
            return Ok(vec![EnvTag::Rye]);
        }
        return Ok(vec![EnvTag::Poetry]);
    }
    if path.join("setup.py").is_file() {
        return Ok(vec![EnvTag::PyVenv, EnvTag::SetupPy]);
    }
    if path.join("requirements.txt").is_file() {
        return Ok(vec![EnvTag::PyVenv, EnvTag::Requirements]);
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).expect("write marker");
    }

    #[tokio::test]
    async fn uv_marker_wins_over_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "pyproject.toml", "[project]\n[tool.uv]\ndev = true\n");
        write(dir.path(), "setup.py", "from setuptools import setup\n");
        write(dir.path(), "requirements.txt", "torch\n");

        let tags = probe_dir(dir.path()).await.expect("probe");
        assert_eq!(tags, vec![EnvTag::Uv]);
    }

    #[tokio::test]
    async fn rye_marker_beats_generic_pyproject() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "pyproject.toml", "[project]\n[tool.rye]\nmanaged = true\n");

        let tags = probe_dir(dir.path()).await.expect("probe");
        assert_eq!(tags, vec![EnvTag::Rye]);
    }

    #[tokio::test]
    async fn generic_pyproject_is_poetry() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "pyproject.toml", "[project]\nname = \"x\"\n");

        let tags = probe_dir(dir.path()).await.expect("probe");
        assert_eq!(tags, vec![EnvTag::Poetry]);
    }

    #[tokio::test]
    async fn setup_py_beats_requirements_txt() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "setup.py", "from setuptools import setup\n");
        write(dir.path(), "requirements.txt", "numpy\n");

        let tags = probe_dir(dir.path()).await.expect("probe");
        assert_eq!(tags, vec![EnvTag::PyVenv, EnvTag::SetupPy]);
    }

    #[tokio::test]
    async fn bare_directory_is_plain_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tags = probe_dir(dir.path()).await.expect("probe");
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn explicit_kind_skips_probing() {
        // Path deliberately does not exist: explicit kinds never touch it.
        let tags = detect(ProjectKind::Uv, Path::new("/nonexistent"))
            .await
            .expect("detect");
        assert_eq!(tags, vec![EnvTag::Uv]);
    }
}
