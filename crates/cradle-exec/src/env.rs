//! The transient execution environment.
//!
//! One [`DockerEnv`] owns one prepared (image, mounts) pair. Preparation
//! is single-flight per instance: the build and every mount sync run at
//! most once even under concurrent callers, guarded by a mutex around the
//! check-then-act on the prepared state. The guard is process-local only —
//! two processes targeting the same image tag can still race, and the
//! system does not adjudicate that race.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cradle_common::config::CradleConfig;
use cradle_common::error::{CradleError, Result};
use cradle_common::types::{ImageRef, ScriptResult};
use cradle_docker::build::{BuildOptions, ImageBuilder};
use cradle_docker::host::DockerHost;
use cradle_docker::process::{CommandExecutor, CommandOutput};
use cradle_docker::rsync::{SyncJob, SyncRunner};
use cradle_schematic::{ContainerSchematic, MountRequest, ProjectDef};
use cradle_storage::StorageResolver;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::placement::HostPlacement;
use crate::script;

/// A host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Directory on the execution host.
    pub source: PathBuf,
    /// Mount point inside the container.
    pub target: PathBuf,
}

/// Outcome of a completed preparation: the built image and the host-side
/// bind mounts backing every mount request.
#[derive(Debug, Clone)]
pub struct PreparedEnv {
    /// Reference to the built image.
    pub image: ImageRef,
    /// Bind mounts in schematic mount order.
    pub binds: Vec<BindMount>,
}

impl PreparedEnv {
    /// Renders the `-v` flags for a docker run/create invocation.
    #[must_use]
    pub fn volume_flags(&self) -> String {
        let mut flags = String::new();
        for bind in &self.binds {
            flags.push_str(&format!(
                " -v {}:{}",
                bind.source.display(),
                bind.target.display()
            ));
        }
        flags
    }
}

/// Runs scripts in throwaway containers: one `docker run --rm` per
/// script, sharing the once-prepared image and mounts.
#[derive(Debug)]
pub struct DockerEnv {
    project: ProjectDef,
    schematic: ContainerSchematic,
    host: DockerHost,
    placement: HostPlacement,
    resolver: Arc<StorageResolver>,
    executor: Arc<dyn CommandExecutor>,
    builder: ImageBuilder,
    sync: Arc<SyncRunner>,
    image_tag: String,
    docker_options: Vec<String>,
    prepared: Mutex<Option<PreparedEnv>>,
}

impl DockerEnv {
    /// Creates an environment for `project` described by `schematic`,
    /// executing against the host configured in `config`.
    #[must_use]
    pub fn new(
        project: ProjectDef,
        schematic: ContainerSchematic,
        config: &CradleConfig,
        resolver: Arc<StorageResolver>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let host = DockerHost::new(config.host.clone());
        let image_tag = config.image_tag_for(project.primary_id().unwrap_or("env"));
        let builder = ImageBuilder::new(host.clone(), Arc::clone(&executor), config.debug_build);
        let sync = Arc::new(SyncRunner::new(host.clone(), Arc::clone(&executor)));
        Self {
            project,
            schematic,
            host,
            placement: HostPlacement::under(&config.host_root),
            resolver,
            executor,
            builder,
            sync,
            image_tag,
            docker_options: Vec::new(),
            prepared: Mutex::new(None),
        }
    }

    /// Overrides the image tag.
    #[must_use]
    pub fn with_image_tag(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = tag.into();
        self
    }

    /// Appends extra flags to the container start invocation.
    #[must_use]
    pub fn with_docker_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.docker_options.extend(options.into_iter().map(Into::into));
        self
    }

    /// The schematic this environment executes.
    #[must_use]
    pub const fn schematic(&self) -> &ContainerSchematic {
        &self.schematic
    }

    /// The docker endpoint this environment targets.
    #[must_use]
    pub const fn host(&self) -> &DockerHost {
        &self.host
    }

    /// The tag the image is built under.
    #[must_use]
    pub fn image_tag(&self) -> &str {
        &self.image_tag
    }

    /// Builds the image and synchronizes every mount, at most once per
    /// instance; callers arriving during an in-flight preparation await
    /// its completion and share the result.
    ///
    /// # Errors
    ///
    /// Propagates build, resolution, and sync failures. A failed
    /// preparation leaves the environment unprepared, so a later call
    /// retries from scratch.
    pub async fn prepare(&self) -> Result<PreparedEnv> {
        let mut slot = self.prepared.lock().await;
        if let Some(prepared) = slot.as_ref() {
            return Ok(prepared.clone());
        }
        tracing::info!(tag = %self.image_tag, host = %self.host.target(), "preparing environment");
        let image = self
            .builder
            .build(&self.schematic, &self.image_tag, &BuildOptions::default())
            .await?;
        let binds = self.prepare_mounts().await?;
        let prepared = PreparedEnv { image, binds };
        *slot = Some(prepared.clone());
        Ok(prepared)
    }

    /// Synchronizes all mounts; independent mounts run concurrently.
    async fn prepare_mounts(&self) -> Result<Vec<BindMount>> {
        let mut tasks: JoinSet<Result<(usize, BindMount)>> = JoinSet::new();
        for (index, mount) in self.schematic.mounts.iter().enumerate() {
            match mount {
                MountRequest::Cache { name, container_path } => {
                    let sync = Arc::clone(&self.sync);
                    let source = self.placement.cache_root.join(name);
                    let target = container_path.clone();
                    let _ = tasks.spawn(async move {
                        sync.ensure_dir(&source).await?;
                        Ok((index, BindMount { source, target }))
                    });
                }
                MountRequest::Resolve { project_id, container_path, excludes } => {
                    let sync = Arc::clone(&self.sync);
                    let resolver = Arc::clone(&self.resolver);
                    let id = project_id.clone();
                    let source = self.host_dir_for(project_id, container_path);
                    let target = container_path.clone();
                    let excludes = excludes.clone();
                    let _ = tasks.spawn(async move {
                        let local = resolver.locate(&id).await?;
                        sync.run(&SyncJob {
                            src: local,
                            dest: source.clone(),
                            excludes,
                            delete: true,
                        })
                        .await?;
                        Ok((index, BindMount { source, target }))
                    });
                }
            }
        }

        let mut indexed = Vec::with_capacity(self.schematic.mounts.len());
        while let Some(joined) = tasks.join_next().await {
            let entry = joined.map_err(|e| CradleError::Transport {
                op: "mount preparation".to_owned(),
                detail: e.to_string(),
            })??;
            indexed.push(entry);
        }
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, bind)| bind).collect())
    }

    /// Runs a script in a fresh transient container, removing the
    /// container when the script finishes.
    ///
    /// # Errors
    ///
    /// Propagates preparation and transport failures. A script that runs
    /// and exits nonzero is `Ok` — inspect the returned
    /// [`ScriptResult::exit_code`].
    pub async fn run_script(&self, script_text: &str) -> Result<ScriptResult> {
        self.run_script_with_timeout(script_text, None).await
    }

    /// Like [`run_script`](Self::run_script) with a caller-supplied
    /// deadline that kills the underlying process when it elapses.
    ///
    /// # Errors
    ///
    /// Additionally returns [`CradleError::Timeout`] when the deadline
    /// elapses.
    pub async fn run_script_with_timeout(
        &self,
        script_text: &str,
        timeout: Option<Duration>,
    ) -> Result<ScriptResult> {
        let prepared = self.prepare().await?;
        let full = script::compose_script(&self.schematic.init_commands, script_text);
        let invocation = script::runner_invocation(&full);

        let mut args = String::from("run --rm");
        for option in &self.docker_options {
            args.push(' ');
            args.push_str(option);
        }
        args.push_str(&prepared.volume_flags());
        args.push_str(&format!(" {} {invocation}", prepared.image));

        let command = self.host.docker_command(&args);
        let output = self.executor.run_with_deadline(&command, timeout).await?;
        classify_script_output(&self.host, "docker run", output)
    }

    fn host_dir_for(&self, project_id: &str, container_path: &Path) -> PathBuf {
        if container_path.starts_with(&self.project.placement.resources_root) {
            self.placement.resource_root.join(project_id)
        } else {
            self.placement.source_root.join(project_id)
        }
    }
}

/// Separates script-level exits from control-plane failures.
///
/// Docker reserves 125 (daemon error) and 126/127 (runner not invocable),
/// and ssh reports 255 on connection failure; those classify as transport
/// errors so retries can target them. Every other exit code belongs to
/// the script.
pub(crate) fn classify_script_output(
    host: &DockerHost,
    op: &str,
    output: CommandOutput,
) -> Result<ScriptResult> {
    let reserved = matches!(output.exit_code, 125..=127)
        || (host.is_remote() && output.exit_code == 255);
    if reserved {
        return Err(CradleError::Transport {
            op: op.to_owned(),
            detail: output.log(),
        });
    }
    Ok(ScriptResult {
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: output.exit_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cradle_common::types::HostTarget;
    use cradle_docker::process::RecordingExecutor;
    use cradle_schematic::{BuildStep, ProjectDir, ProjectKind};
    use std::collections::HashMap;

    fn fixture(executor: &Arc<RecordingExecutor>, source_dir: &Path) -> DockerEnv {
        let project = ProjectDef::new(vec![ProjectDir::new("demo", ProjectKind::Source)]);
        let schematic = ContainerSchematic::new("ubuntu:22.04")
            .with_step(BuildStep::run("true"))
            .with_init("cd /sources/demo")
            .with_mount(MountRequest::cache("uv_cache", "/root/.cache/uv"))
            .with_mount(MountRequest::resolve("demo", "/sources/demo"));
        let resolver = Arc::new(StorageResolver::from_map(HashMap::from([(
            "demo".to_owned(),
            source_dir.to_path_buf(),
        )])));
        DockerEnv::new(
            project,
            schematic,
            &CradleConfig::default(),
            resolver,
            Arc::clone(executor) as Arc<dyn CommandExecutor>,
        )
    }

    #[tokio::test]
    async fn prepare_builds_then_syncs_each_mount_once() {
        let executor = Arc::new(RecordingExecutor::new());
        let dir = tempfile::tempdir().expect("tempdir");
        let env = fixture(&executor, dir.path());

        let prepared = env.prepare().await.expect("prepare");
        assert_eq!(prepared.binds.len(), 2);
        assert_eq!(executor.count_matching("docker build"), 1);
        assert_eq!(executor.count_matching("rsync -a --delete"), 1);
        assert_eq!(prepared.binds[0].target, PathBuf::from("/root/.cache/uv"));
        assert_eq!(prepared.binds[1].source, PathBuf::from("/tmp/cradle/sources/demo"));
    }

    #[tokio::test]
    async fn concurrent_prepare_runs_the_body_once() {
        let executor = Arc::new(RecordingExecutor::new());
        let dir = tempfile::tempdir().expect("tempdir");
        let env = Arc::new(fixture(&executor, dir.path()));

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let env = Arc::clone(&env);
            let _ = tasks.spawn(async move { env.prepare().await });
        }
        while let Some(joined) = tasks.join_next().await {
            let _ = joined.expect("join").expect("prepare");
        }

        assert_eq!(executor.count_matching("docker build"), 1);
        assert_eq!(executor.count_matching("rsync -a --delete"), 1);
    }

    #[tokio::test]
    async fn run_script_attaches_mounts_and_removes_container() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond("docker run", RecordingExecutor::ok("hello\n"));
        let dir = tempfile::tempdir().expect("tempdir");
        let env = fixture(&executor, dir.path());

        let result = env.run_script("echo hello").await.expect("run");
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.exit_code, 0);

        let run_cmd = executor
            .commands()
            .into_iter()
            .find(|c| c.contains("docker run"))
            .expect("run command");
        assert!(run_cmd.contains("--rm"));
        assert!(run_cmd.contains("-v /tmp/cradle/cache/uv_cache:/root/.cache/uv"));
        assert!(run_cmd.contains("-v /tmp/cradle/sources/demo:/sources/demo"));
        assert!(run_cmd.contains("bash /usr/local/bin/cradle-runner.sh "));
    }

    #[tokio::test]
    async fn nonzero_script_exit_is_a_result_not_an_error() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond("docker run", RecordingExecutor::fail(3, ""));
        let dir = tempfile::tempdir().expect("tempdir");
        let env = fixture(&executor, dir.path());

        let result = env.run_script("exit 3").await.expect("run");
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn docker_reserved_exit_codes_are_transport_errors() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond(
            "docker run",
            RecordingExecutor::fail(125, "Cannot connect to the Docker daemon"),
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let env = fixture(&executor, dir.path());

        let err = env.run_script("echo hi").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn unknown_project_id_fails_preparation() {
        let executor = Arc::new(RecordingExecutor::new());
        let project = ProjectDef::new(vec![ProjectDir::new("demo", ProjectKind::Source)]);
        let schematic = ContainerSchematic::new("ubuntu:22.04")
            .with_mount(MountRequest::resolve("missing", "/sources/missing"));
        let resolver = Arc::new(StorageResolver::from_map(HashMap::new()));
        let env = DockerEnv::new(
            project,
            schematic,
            &CradleConfig::default(),
            resolver,
            Arc::clone(&executor) as Arc<dyn CommandExecutor>,
        );

        let err = env.prepare().await.unwrap_err();
        match err {
            CradleError::UnknownId { id } => assert_eq!(id, "missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn ssh_connection_failure_classifies_as_transport() {
        let host = DockerHost::new(HostTarget::Ssh("zeus".into()));
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "Connection refused".into(),
            exit_code: 255,
        };
        let err = classify_script_output(&host, "docker run", output).unwrap_err();
        assert!(err.is_transport());
    }
}
