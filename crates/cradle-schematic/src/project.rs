//! Project definitions consumed by the assembler.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use cradle_common::constants::{DEFAULT_RESOURCES_ROOT, DEFAULT_SOURCES_ROOT};
use cradle_common::error::CradleError;
use serde::{Deserialize, Serialize};

/// Sync exclusion patterns applied to every project directory by default.
pub const DEFAULT_IGNORES: &[&str] = &[
    ".git",
    ".venv",
    "venv",
    ".idea",
    "__pycache__",
    "*.pyc",
    "*.log",
    "*.pth",
    "*.pkl",
    "*.tar.gz",
];

/// How a project directory participates in the environment.
///
/// A closed set: adding a kind is a compile-time enum extension, and
/// parsing an unrecognized literal fails loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProjectKind {
    /// Probe the resolved directory to pick an environment flavor.
    #[default]
    Auto,
    /// Plain source tree, no environment setup.
    Source,
    /// Data-only directory mounted under the resources root.
    Resource,
    /// uv-managed python project.
    Uv,
    /// rye-managed python project.
    Rye,
    /// Legacy `setup.py` python project.
    SetupPy,
    /// `requirements.txt` python project.
    Requirements,
}

impl FromStr for ProjectKind {
    type Err = CradleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "source" => Ok(Self::Source),
            "resource" => Ok(Self::Resource),
            "uv" => Ok(Self::Uv),
            "rye" => Ok(Self::Rye),
            "setup.py" => Ok(Self::SetupPy),
            "requirements.txt" => Ok(Self::Requirements),
            other => Err(CradleError::UnsupportedKind { kind: other.to_owned() }),
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Source => "source",
            Self::Resource => "resource",
            Self::Uv => "uv",
            Self::Rye => "rye",
            Self::SetupPy => "setup.py",
            Self::Requirements => "requirements.txt",
        };
        write!(f, "{s}")
    }
}

/// One directory of a project, keyed by its storage-resolver id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDir {
    /// Storage-resolver key.
    pub id: String,
    /// Participation kind.
    pub kind: ProjectKind,
    /// Other project directories this one requires mounted.
    pub dependencies: Vec<ProjectDir>,
    /// Sync exclusion patterns.
    pub excludes: Vec<String>,
}

impl ProjectDir {
    /// Creates a directory with the default ignore set and no
    /// dependencies.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ProjectKind) -> Self {
        Self {
            id: id.into(),
            kind,
            dependencies: Vec::new(),
            excludes: DEFAULT_IGNORES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    /// Iterates this directory and its transitive dependencies,
    /// dependencies first.
    pub fn walk(&self) -> Vec<&ProjectDir> {
        let mut out = Vec::new();
        for dep in &self.dependencies {
            out.extend(dep.walk());
        }
        out.push(self);
        out
    }
}

/// Policy for where sources and resources land inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPlacement {
    /// In-container root for synchronized sources.
    pub sources_root: PathBuf,
    /// In-container root for synchronized resources.
    pub resources_root: PathBuf,
}

impl Default for ProjectPlacement {
    fn default() -> Self {
        Self {
            sources_root: PathBuf::from(DEFAULT_SOURCES_ROOT),
            resources_root: PathBuf::from(DEFAULT_RESOURCES_ROOT),
        }
    }
}

/// A project: an ordered set of directories plus placement policy.
///
/// Constructed by the caller per invocation, immutable, consumed once by
/// the assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDef {
    /// Ordered project directories; the first is the primary one.
    pub dirs: Vec<ProjectDir>,
    /// Placement policy.
    pub placement: ProjectPlacement,
    /// Working directory scripts start in.
    pub default_working_dir: PathBuf,
}

impl ProjectDef {
    /// Creates a project with default placement; the working directory
    /// defaults to the primary directory under the sources root.
    #[must_use]
    pub fn new(dirs: Vec<ProjectDir>) -> Self {
        let placement = ProjectPlacement::default();
        let default_working_dir = dirs
            .first()
            .map_or_else(|| PathBuf::from("/"), |d| placement.sources_root.join(&d.id));
        Self {
            dirs,
            placement,
            default_working_dir,
        }
    }

    /// Returns the primary directory's id, if any.
    #[must_use]
    pub fn primary_id(&self) -> Option<&str> {
        self.dirs.first().map(|d| d.id.as_str())
    }

    /// Iterates all directories including transitive dependencies,
    /// dependencies first within each top-level entry.
    pub fn project_dirs(&self) -> Vec<&ProjectDir> {
        let mut out = Vec::new();
        for dir in &self.dirs {
            out.extend(dir.walk());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_known_literals() {
        assert_eq!("uv".parse::<ProjectKind>().expect("uv"), ProjectKind::Uv);
        assert_eq!(
            "setup.py".parse::<ProjectKind>().expect("setup.py"),
            ProjectKind::SetupPy
        );
    }

    #[test]
    fn kind_rejects_unknown_literal() {
        let err = "conda".parse::<ProjectKind>().unwrap_err();
        assert!(err.to_string().contains("conda"));
    }

    #[test]
    fn working_dir_defaults_to_primary_source() {
        let def = ProjectDef::new(vec![ProjectDir::new("demo", ProjectKind::Uv)]);
        assert_eq!(def.default_working_dir, PathBuf::from("/sources/demo"));
    }

    #[test]
    fn empty_project_falls_back_to_root_workdir() {
        let def = ProjectDef::new(Vec::new());
        assert_eq!(def.default_working_dir, PathBuf::from("/"));
    }

    #[test]
    fn project_dirs_yields_dependencies_first() {
        let mut main = ProjectDir::new("main", ProjectKind::Uv);
        main.dependencies.push(ProjectDir::new("data", ProjectKind::Resource));
        let def = ProjectDef::new(vec![main]);
        let ids: Vec<&str> = def.project_dirs().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["data", "main"]);
    }
}
