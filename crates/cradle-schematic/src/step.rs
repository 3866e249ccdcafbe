//! Typed build instructions.
//!
//! A schematic's build steps are data, not deferred callables: the image
//! builder renders them into a Dockerfile and a staged context directory
//! in one eager pass at build time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One build instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStep {
    /// A literal Dockerfile line (`RUN …`, `ENV …`, `WORKDIR …`).
    Raw(String),
    /// Stages a host file or directory into the build context and emits a
    /// `COPY` into the image.
    CopyFromHost {
        /// Host-side path to stage.
        source: PathBuf,
        /// In-image destination path.
        dest: PathBuf,
    },
    /// Stages generated file contents into the build context and emits a
    /// `COPY` into the image.
    EmbedFile {
        /// File contents to write into the context.
        contents: String,
        /// In-image destination path.
        dest: PathBuf,
    },
}

impl BuildStep {
    /// A `RUN` instruction.
    #[must_use]
    pub fn run(cmd: impl AsRef<str>) -> Self {
        Self::Raw(format!("RUN {}", cmd.as_ref()))
    }

    /// An `ENV` instruction.
    #[must_use]
    pub fn env(key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        Self::Raw(format!("ENV {}={}", key.as_ref(), value.as_ref()))
    }

    /// A `WORKDIR` instruction.
    #[must_use]
    pub fn workdir(path: impl AsRef<Path>) -> Self {
        Self::Raw(format!("WORKDIR {}", path.as_ref().display()))
    }

    /// Name under which this step's payload is staged inside the build
    /// context, derived from the in-image destination so re-staging the
    /// same destination is stable across builds.
    ///
    /// Returns `None` for raw lines, which stage nothing.
    #[must_use]
    pub fn staged_name(&self) -> Option<String> {
        match self {
            Self::Raw(_) => None,
            Self::CopyFromHost { dest, .. } | Self::EmbedFile { dest, .. } => {
                Some(path_hash(dest))
            }
        }
    }

    /// Renders this step as a Dockerfile line.
    #[must_use]
    pub fn dockerfile_line(&self) -> String {
        match self {
            Self::Raw(line) => line.clone(),
            Self::CopyFromHost { dest, .. } | Self::EmbedFile { dest, .. } => {
                // staged_name is Some for both staging variants
                let staged = self.staged_name().unwrap_or_default();
                format!("COPY {staged} {}", dest.display())
            }
        }
    }
}

/// Short content-addressed name for a staged destination path.
fn path_hash(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let mut hex = String::with_capacity(16);
    for byte in &digest[..8] {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_helper_prefixes_run() {
        assert_eq!(
            BuildStep::run("apt-get update").dockerfile_line(),
            "RUN apt-get update"
        );
    }

    #[test]
    fn staged_name_is_stable_per_destination() {
        let a = BuildStep::EmbedFile {
            contents: "one".into(),
            dest: PathBuf::from("/usr/local/bin/tool.sh"),
        };
        let b = BuildStep::CopyFromHost {
            source: PathBuf::from("/anywhere"),
            dest: PathBuf::from("/usr/local/bin/tool.sh"),
        };
        assert_eq!(a.staged_name(), b.staged_name());
        assert_eq!(a.staged_name().expect("staged").len(), 16);
    }

    #[test]
    fn copy_line_uses_staged_name() {
        let step = BuildStep::CopyFromHost {
            source: PathBuf::from("/host/src"),
            dest: PathBuf::from("/app"),
        };
        let line = step.dockerfile_line();
        assert!(line.starts_with("COPY "));
        assert!(line.ends_with(" /app"));
    }

    #[test]
    fn raw_steps_stage_nothing() {
        assert!(BuildStep::Raw("RUN true".into()).staged_name().is_none());
    }
}
