//! The standard component library.
//!
//! One constructor per environment flavor, mirroring the package-manager
//! conventions the detector recognizes. Constructors take their shared
//! dependencies as arguments so one `Arc` instance backs every reference
//! in the assembled graph.

use std::path::PathBuf;
use std::sync::Arc;

use cradle_common::config::CradleConfig;
use cradle_common::constants::RUNNER_PATH;
use cradle_common::error::{CradleError, Result};
use cradle_storage::StorageResolver;
use sha2::{Digest, Sha256};

use crate::assemble::{ContainerSchematic, assemble};
use crate::component::EnvComponent;
use crate::detect::{EnvTag, detect};
use crate::mounts::MountRequest;
use crate::project::{ProjectDef, ProjectKind};
use crate::step::BuildStep;

/// Shell program that decodes and executes a base64-encoded script.
///
/// This is the binary-safe transport that keeps arbitrary script content
/// intact across nested shell quoting (ssh, docker run, docker exec).
/// Diagnostics go to stderr so the executed script owns stdout.
const RUNNER_SCRIPT: &str = r#"#!/bin/bash

echo "Running base64 encoded script..." >&2

# Check if an argument is provided
if [ $# -eq 0 ]; then
    echo "Error: No base64 encoded script provided." >&2
    echo "Usage: $0 <base64_encoded_script>" >&2
    exit 1
fi

# Get the base64 encoded script from the first argument
encoded_script="$1"
decoded_script=$(echo "$encoded_script" | base64 -d)

echo "====== BEGIN SCRIPT ======" >&2
echo "$decoded_script" >&2
echo "======  END  SCRIPT ======" >&2

# Decode the script and execute it
echo "$encoded_script" | base64 -d | bash

# Check the exit status of the decoded script
exit_status=$?

echo "Base64 encoded script executed with exit status $exit_status" >&2
# Exit with the same status as the decoded script
exit $exit_status
"#;

/// Installs the script runner into the image.
#[must_use]
pub fn script_runner() -> Arc<EnvComponent> {
    EnvComponent::builder("script-runner")
        .step(BuildStep::EmbedFile {
            contents: RUNNER_SCRIPT.to_owned(),
            dest: PathBuf::from(RUNNER_PATH),
        })
        .step(BuildStep::run(format!("chmod +x {RUNNER_PATH}")))
        .build()
}

/// Base apt toolchain layer shared by every python flavor.
#[must_use]
pub fn base_apt_packages() -> Arc<EnvComponent> {
    EnvComponent::builder("base-apt-packages")
        .raw_steps([
            "ENV DEBIAN_FRONTEND=noninteractive",
            "RUN apt-get update && apt-get install -y python3-pip python3-dev build-essential libssl-dev curl",
            "RUN apt-get install -y libgl1-mesa-glx libglib2.0-0",
            "RUN apt-get install -y git",
            "RUN apt-get install -y clang",
            "RUN apt-get install -y rsync",
        ])
        .build()
}

/// Rust toolchain layer required by uv's native builds.
#[must_use]
pub fn rustup() -> Arc<EnvComponent> {
    EnvComponent::builder("rustup")
        .raw_steps([
            "RUN apt-get update && apt-get install -y curl",
            "RUN curl https://sh.rustup.rs -sSf | sh -s -- -y",
        ])
        .build()
}

/// Hugging Face cache directory, shared across builds.
#[must_use]
pub fn hf_cache() -> Arc<EnvComponent> {
    let container_path = PathBuf::from("/cache/huggingface");
    EnvComponent::builder("hf-cache")
        .step(BuildStep::env("HF_HOME", container_path.display().to_string()))
        .mount(MountRequest::cache("hf_cache", container_path))
        .build()
}

/// uv-managed python environment.
///
/// The virtualenv lives inside the `uv_venv` cache under a per-run id so
/// stale environments never leak between runs while the package cache
/// persists.
#[must_use]
pub fn uv(
    project: &ProjectDef,
    base_apt: &Arc<EnvComponent>,
    rust: &Arc<EnvComponent>,
) -> Arc<EnvComponent> {
    let workdir = project.default_working_dir.display().to_string();
    EnvComponent::builder("uv")
        .raw_steps([
            "RUN curl -LsSf https://astral.sh/uv/install.sh | sh",
            "RUN echo 'source $HOME/.cargo/env' >> ~/.bashrc",
            "ENV PATH=/root/.cargo/bin:$PATH",
            "RUN uv --version",
        ])
        .depends_on(Arc::clone(rust))
        .depends_on(Arc::clone(base_apt))
        .init(format!("cd {workdir}"))
        .init("source $HOME/.cargo/env")
        .init("export VIRTUAL_ENV=/root/.cache/uv_venv/$(date +%s)")
        .init("uv sync")
        .init("source \"$VIRTUAL_ENV/bin/activate\"")
        .mount(MountRequest::cache("uv_cache", "/root/.cache/uv"))
        .mount(MountRequest::cache("uv_venv", "/root/.cache/uv_venv"))
        .build()
}

/// rye-managed python environment (uv-backed).
#[must_use]
pub fn rye(project: &ProjectDef, base_apt: &Arc<EnvComponent>) -> Arc<EnvComponent> {
    let workdir = project.default_working_dir.display().to_string();
    EnvComponent::builder("rye")
        .raw_steps([
            "RUN pip3 install --upgrade pip setuptools",
            "ENV RYE_HOME=/opt/rye",
            "ENV PATH=$RYE_HOME/shims:$PATH",
            "RUN curl -sSf https://rye.astral.sh/get | RYE_NO_AUTO_INSTALL=1 RYE_INSTALL_OPTION=\"--yes\" bash",
            "RUN rye config --set-bool behavior.use-uv=true",
            "RUN curl -LsSf https://astral.sh/uv/install.sh | sh",
        ])
        .depends_on(Arc::clone(base_apt))
        .init(format!("cd {workdir}"))
        .init("rye sync")
        .init(format!(". {workdir}/.venv/bin/activate"))
        .mount(MountRequest::cache("uv_cache", "/root/.cache/uv"))
        .mount(MountRequest::cache("rye_python", "/opt/rye/py"))
        .build()
}

/// pyenv-provisioned interpreter plus a per-project virtualenv.
///
/// The virtualenv path embeds a short hash of the project id so two
/// projects sharing the cache volume never collide.
#[must_use]
pub fn pyenv(
    project: &ProjectDef,
    python_version: &str,
    base_apt: &Arc<EnvComponent>,
) -> Arc<EnvComponent> {
    let venv_path = venv_path_for(project);
    EnvComponent::builder("pyenv")
        .raw_steps([
            "ENV DEBIAN_FRONTEND=noninteractive".to_owned(),
            "RUN apt-get update && apt-get install -y make build-essential libssl-dev zlib1g-dev \
             libbz2-dev libreadline-dev libsqlite3-dev wget curl llvm libncursesw5-dev \
             xz-utils tk-dev libffi-dev liblzma-dev python3-openssl git"
                .to_owned(),
            "RUN curl https://pyenv.run | bash".to_owned(),
            "ENV HOME=/root".to_owned(),
            "ENV PYENV_ROOT=$HOME/.pyenv".to_owned(),
            "ENV PATH=$PYENV_ROOT/bin:$PATH".to_owned(),
            "RUN echo 'eval \"$(pyenv init --path)\"' >> ~/.bashrc && echo 'eval \"$(pyenv virtualenv-init -)\"' >> ~/.bashrc".to_owned(),
            "SHELL [\"/bin/bash\",\"--login\",\"-c\"]".to_owned(),
            format!("RUN pyenv install {python_version}"),
            format!("RUN pyenv global {python_version}"),
            "ENV PATH=$PYENV_ROOT/shims:$PATH".to_owned(),
        ])
        .depends_on(Arc::clone(base_apt))
        .init("export PIP_CACHE_DIR=/root/pip_cache/pip")
        .init(format!(
            "if [ ! -d {venv} ]; then python -m venv {venv}; fi",
            venv = venv_path.display()
        ))
        .init(format!("source {}/bin/activate", venv_path.display()))
        .mount(MountRequest::cache("pip_cache", "/root/pip_cache"))
        .mount(MountRequest::cache("virtualenvs", "/root/virtualenvs"))
        .build()
}

/// Editable install of a `setup.py` project into the pyenv virtualenv.
#[must_use]
pub fn setup_py(project: &ProjectDef, py: &Arc<EnvComponent>) -> Arc<EnvComponent> {
    let workdir = project.default_working_dir.display().to_string();
    EnvComponent::builder("setup-py")
        .depends_on(Arc::clone(py))
        .init(format!("cd {workdir}"))
        .init("pip install -e .")
        .build()
}

/// Install from `requirements.txt` into the pyenv virtualenv.
///
/// Packages that cannot resolve their own build dependencies (`xformers`
/// needs torch present first) install after the bulk with
/// `--no-dependencies`.
#[must_use]
pub fn requirements(
    project: &ProjectDef,
    requirements_text: &str,
    py: &Arc<EnvComponent>,
) -> Arc<EnvComponent> {
    let workdir = project.default_working_dir.display().to_string();
    let mut common = Vec::new();
    let mut staged = Vec::new();
    for line in requirements_text.lines() {
        let package = line.split('#').next().unwrap_or_default().trim();
        if package.is_empty() {
            continue;
        }
        if package.contains("xformers") {
            staged.push(package.to_owned());
        } else {
            common.push(format!("'{package}'"));
        }
    }

    let mut builder = EnvComponent::builder("requirements-txt")
        .depends_on(Arc::clone(py))
        .init(format!("cd {workdir}"));
    if !common.is_empty() {
        builder = builder.init(format!("pip install {}", common.join(" ")));
    }
    for package in staged {
        builder = builder.init(format!("pip install {package} --no-dependencies"));
    }
    builder.init("echo 'requirements.txt installed' >&2").build()
}

/// Resolve mounts for every directory of the project: resources under the
/// resources root, everything else under the sources root.
#[must_use]
pub fn project_sync(project: &ProjectDef) -> Arc<EnvComponent> {
    let mut builder = EnvComponent::builder("project-sync");
    for dir in project.project_dirs() {
        let root = if dir.kind == ProjectKind::Resource {
            &project.placement.resources_root
        } else {
            &project.placement.sources_root
        };
        builder = builder.mount(MountRequest::Resolve {
            project_id: dir.id.clone(),
            container_path: root.join(&dir.id),
            excludes: dir.excludes.clone(),
        });
    }
    builder.build()
}

/// Selects catalog components for a project by detecting its primary
/// directory's environment flavor.
///
/// # Errors
///
/// Fails if the primary directory cannot be located, a marker file cannot
/// be read, the flavor is unsupported (`poetry`), or the requirements file
/// is unreadable.
pub async fn components_for(
    project: &ProjectDef,
    config: &CradleConfig,
    resolver: &StorageResolver,
) -> Result<Vec<Arc<EnvComponent>>> {
    let base_apt = base_apt_packages();

    let mut python_components = Vec::new();
    if let Some(primary) = project.dirs.first() {
        let local_root = resolver.locate(&primary.id).await?;
        let tags = detect(primary.kind, &local_root).await?;
        tracing::info!(project = %primary.id, ?tags, "environment flavor selected");

        let py = pyenv(project, &config.python_version, &base_apt);
        for tag in tags {
            match tag {
                EnvTag::Uv => python_components.push(uv(project, &base_apt, &rustup())),
                EnvTag::Rye => python_components.push(rye(project, &base_apt)),
                EnvTag::PyVenv => python_components.push(Arc::clone(&py)),
                EnvTag::SetupPy => python_components.push(setup_py(project, &py)),
                EnvTag::Requirements => {
                    let path = local_root.join("requirements.txt");
                    let text = tokio::fs::read_to_string(&path)
                        .await
                        .map_err(|e| CradleError::io(&path, e))?;
                    python_components.push(requirements(project, &text, &py));
                }
                EnvTag::Poetry => {
                    return Err(CradleError::UnsupportedKind { kind: "poetry".to_owned() });
                }
            }
        }
    }

    let setup = {
        let mut builder = EnvComponent::builder("project-setup");
        for component in &python_components {
            builder = builder.depends_on(Arc::clone(component));
        }
        builder.build()
    };

    Ok(vec![
        script_runner(),
        base_apt,
        hf_cache(),
        setup,
        project_sync(project),
    ])
}

/// Detects, selects, and assembles in one step: the composition entry
/// point for a project definition.
///
/// # Errors
///
/// Propagates selection failures (5.3) and assembly failures (5.4).
pub async fn universal_schematic(
    project: &ProjectDef,
    config: &CradleConfig,
    resolver: &StorageResolver,
) -> Result<ContainerSchematic> {
    let components = components_for(project, config, resolver).await?;
    assemble(config.base_image.clone(), &components)
}

fn venv_path_for(project: &ProjectDef) -> PathBuf {
    let id = project.primary_id().unwrap_or("project");
    let digest = Sha256::digest(id.as_bytes());
    let mut short = String::with_capacity(6);
    for byte in &digest[..3] {
        short.push_str(&format!("{byte:02x}"));
    }
    PathBuf::from(format!("/root/virtualenvs/{id}_{short}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::project::ProjectDir;

    use super::*;

    fn demo_project(kind: ProjectKind) -> ProjectDef {
        ProjectDef::new(vec![ProjectDir::new("demo", kind)])
    }

    fn resolver_for(dir: &std::path::Path) -> StorageResolver {
        StorageResolver::from_map(HashMap::from([(
            "demo".to_owned(),
            dir.to_path_buf(),
        )]))
    }

    #[tokio::test]
    async fn uv_project_assembles_with_runner_and_caches() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("pyproject.toml"), "[tool.uv]\n").expect("write");

        let config = CradleConfig::default();
        let resolver = resolver_for(dir.path());
        let project = demo_project(ProjectKind::Auto);

        let schematic = universal_schematic(&project, &config, &resolver)
            .await
            .expect("schematic");

        let preview = schematic.dockerfile_preview();
        assert!(preview.contains("astral.sh/uv/install.sh"));
        assert!(preview.contains(RUNNER_PATH));
        let cache_names: Vec<&str> = schematic
            .mounts
            .iter()
            .filter_map(|m| match m {
                MountRequest::Cache { name, .. } => Some(name.as_str()),
                MountRequest::Resolve { .. } => None,
            })
            .collect();
        assert!(cache_names.contains(&"uv_cache"));
        assert!(cache_names.contains(&"uv_venv"));
    }

    #[tokio::test]
    async fn uv_init_runs_after_dependency_layers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CradleConfig::default();
        let resolver = resolver_for(dir.path());
        let project = demo_project(ProjectKind::Uv);

        let schematic = universal_schematic(&project, &config, &resolver)
            .await
            .expect("schematic");
        let preview = schematic.dockerfile_preview();
        let rust_pos = preview.find("sh.rustup.rs").expect("rustup layer");
        let uv_pos = preview.find("astral.sh/uv/install.sh").expect("uv layer");
        assert!(rust_pos < uv_pos, "rust toolchain must precede uv");
        assert!(schematic.init_commands.contains(&"uv sync".to_owned()));
    }

    #[tokio::test]
    async fn poetry_project_is_rejected_loudly() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("pyproject.toml"), "[tool.poetry]\n").expect("write");

        let config = CradleConfig::default();
        let resolver = resolver_for(dir.path());
        let project = demo_project(ProjectKind::Auto);

        let err = universal_schematic(&project, &config, &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, CradleError::UnsupportedKind { .. }));
    }

    #[tokio::test]
    async fn requirements_flavor_stages_xformers_separately() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("requirements.txt"),
            "torch==2.1\nxformers==0.0.23 # needs torch first\nnumpy\n",
        )
        .expect("write");

        let config = CradleConfig::default();
        let resolver = resolver_for(dir.path());
        let project = demo_project(ProjectKind::Auto);

        let schematic = universal_schematic(&project, &config, &resolver)
            .await
            .expect("schematic");
        let bulk = schematic
            .init_commands
            .iter()
            .find(|c| c.starts_with("pip install '"))
            .expect("bulk install");
        assert!(bulk.contains("'torch==2.1'"));
        assert!(!bulk.contains("xformers"));
        assert!(
            schematic
                .init_commands
                .contains(&"pip install xformers==0.0.23 --no-dependencies".to_owned())
        );
    }

    #[tokio::test]
    async fn resource_dirs_mount_under_resources_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CradleConfig::default();
        let resolver = resolver_for(dir.path());
        let mut project = demo_project(ProjectKind::Source);
        project.dirs.push(ProjectDir::new("data", ProjectKind::Resource));

        let schematic = universal_schematic(&project, &config, &resolver)
            .await
            .expect("schematic");
        let resolve_targets: Vec<String> = schematic
            .mounts
            .iter()
            .filter_map(|m| match m {
                MountRequest::Resolve { container_path, .. } => {
                    Some(container_path.display().to_string())
                }
                MountRequest::Cache { .. } => None,
            })
            .collect();
        assert!(resolve_targets.contains(&"/sources/demo".to_owned()));
        assert!(resolve_targets.contains(&"/resources/data".to_owned()));
    }
}
