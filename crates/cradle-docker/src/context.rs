//! Build-context staging.
//!
//! Renders a schematic's build steps into a Dockerfile and stages copy
//! payloads into a temporary directory under content-addressed names, so
//! identical destinations re-stage identically across builds.

use std::path::Path;

use cradle_common::error::{CradleError, Result};
use cradle_schematic::{BuildStep, ContainerSchematic};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::process::CommandExecutor;

/// A staged build context: a temp directory holding the Dockerfile and
/// every copy payload. The directory is removed on drop.
#[derive(Debug)]
pub struct StagedContext {
    dir: TempDir,
    /// Rendered Dockerfile contents.
    pub dockerfile: String,
}

impl StagedContext {
    /// Path of the staged context directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Order-independent content hash over every staged file, usable as a
    /// build-identity diagnostic.
    ///
    /// # Errors
    ///
    /// Returns an error if a staged file cannot be read.
    pub fn content_hash(&self) -> Result<String> {
        let mut entries = Vec::new();
        collect_file_hashes(self.dir.path(), self.dir.path(), &mut entries)?;
        entries.sort();
        let digest = Sha256::digest(entries.join("\n").as_bytes());
        Ok(format!("{digest:x}"))
    }
}

/// Stages the schematic into a fresh temp directory.
///
/// Raw steps render directly; `CopyFromHost` payloads are copied in with
/// `cp -r` through the executor; `EmbedFile` payloads are written from
/// memory.
///
/// # Errors
///
/// Returns an error if the temp directory cannot be created, a host copy
/// fails, or a payload cannot be written.
pub async fn stage(
    schematic: &ContainerSchematic,
    executor: &dyn CommandExecutor,
) -> Result<StagedContext> {
    let dir = tempfile::tempdir().map_err(|e| CradleError::io("build context", e))?;

    let mut dockerfile = format!("FROM {} AS base\n", schematic.base_image);
    for step in &schematic.build_steps {
        dockerfile.push_str(&step.dockerfile_line());
        dockerfile.push('\n');
        stage_payload(step, dir.path(), executor).await?;
    }

    let dockerfile_path = dir.path().join("Dockerfile");
    tokio::fs::write(&dockerfile_path, &dockerfile)
        .await
        .map_err(|e| CradleError::io(&dockerfile_path, e))?;
    tracing::debug!(context = %dir.path().display(), "build context staged");

    Ok(StagedContext { dir, dockerfile })
}

async fn stage_payload(
    step: &BuildStep,
    context_dir: &Path,
    executor: &dyn CommandExecutor,
) -> Result<()> {
    let Some(staged_name) = step.staged_name() else {
        return Ok(());
    };
    let staged_path = context_dir.join(&staged_name);
    match step {
        BuildStep::Raw(_) => Ok(()),
        BuildStep::CopyFromHost { source, .. } => {
            let output = executor
                .run(&format!(
                    "cp -r {} {}",
                    source.display(),
                    staged_path.display()
                ))
                .await?;
            if output.success() {
                Ok(())
            } else {
                Err(CradleError::Transport {
                    op: format!("staging {}", source.display()),
                    detail: output.log(),
                })
            }
        }
        BuildStep::EmbedFile { contents, .. } => tokio::fs::write(&staged_path, contents)
            .await
            .map_err(|e| CradleError::io(&staged_path, e)),
    }
}

fn collect_file_hashes(root: &Path, dir: &Path, entries: &mut Vec<String>) -> Result<()> {
    let listing = std::fs::read_dir(dir).map_err(|e| CradleError::io(dir, e))?;
    for entry in listing {
        let entry = entry.map_err(|e| CradleError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_file_hashes(root, &path, entries)?;
        } else {
            let bytes = std::fs::read(&path).map_err(|e| CradleError::io(&path, e))?;
            let rel = path.strip_prefix(root).unwrap_or(&path).display().to_string();
            let digest = Sha256::digest(&bytes);
            entries.push(format!("{rel}:{digest:x}"));
        }
    }
    Ok(())
}
