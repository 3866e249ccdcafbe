//! The persistent execution environment.
//!
//! Keeps one named container alive across script executions so
//! in-container state (installed packages, filesystem writes) survives
//! between calls. The handle assumes at most one live owner per container
//! name; the guarantee is process-local, like the transient environment's
//! single-flight preparation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cradle_common::config::CradleConfig;
use cradle_common::error::{CradleError, Result};
use cradle_common::types::{ContainerName, Lifecycle, ScriptResult};
use cradle_docker::host::DockerHost;
use cradle_docker::process::{CommandExecutor, CommandOutput};
use cradle_schematic::{ContainerSchematic, ProjectDef};
use cradle_storage::StorageResolver;
use tokio::sync::Mutex;

use crate::env::{DockerEnv, classify_script_output};
use crate::script;

/// Attempts to observe the container running after starting it.
const READY_POLL_ATTEMPTS: u32 = 30;

/// Delay between readiness polls.
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A named long-lived container that executes scripts via `docker exec`.
///
/// Containers start with `--rm`, so [`stop`](Self::stop) both stops and
/// removes them; a later [`run_script`](Self::run_script) cleanly
/// recreates the container under the same name. Host-side paths passed to
/// [`upload`](Self::upload)/[`download`](Self::download) are interpreted
/// on the machine the docker daemon runs on.
#[derive(Debug)]
pub struct PersistentEnv {
    env: DockerEnv,
    name: ContainerName,
    host: DockerHost,
    executor: Arc<dyn CommandExecutor>,
    lifecycle: Mutex<Lifecycle>,
    exec_lock: Mutex<()>,
    /// Creation timestamp of this handle.
    pub created_at: String,
}

impl PersistentEnv {
    /// Creates a handle owning the container `name`.
    #[must_use]
    pub fn new(
        project: ProjectDef,
        schematic: ContainerSchematic,
        config: &CradleConfig,
        resolver: Arc<StorageResolver>,
        executor: Arc<dyn CommandExecutor>,
        name: ContainerName,
    ) -> Self {
        let host = DockerHost::new(config.host.clone());
        let env = DockerEnv::new(
            project,
            schematic,
            config,
            resolver,
            Arc::clone(&executor),
        );
        Self {
            env,
            name,
            host,
            executor,
            lifecycle: Mutex::new(Lifecycle::Unstarted),
            exec_lock: Mutex::new(()),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// The container name this handle owns.
    #[must_use]
    pub const fn name(&self) -> &ContainerName {
        &self.name
    }

    /// The current lifecycle state of the handle.
    pub async fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().await
    }

    /// Ensures the named container exists and is running, preparing the
    /// image and mounts first if needed.
    ///
    /// # Errors
    ///
    /// Propagates preparation failures and transport errors from the
    /// container inspection or start.
    pub async fn ensure_container(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match self.container_state().await? {
            Some(state) if state == "running" => {
                *lifecycle = Lifecycle::Running;
                return Ok(());
            }
            Some(state) => {
                // A dead container under our name (daemon restart skips
                // the --rm cleanup); remove it before recreating.
                tracing::warn!(name = %self.name, %state, "removing stale container");
                *lifecycle = Lifecycle::Stopped;
                let _ = self
                    .expect_ok(
                        "docker rm",
                        &self.host.docker_command(&format!("rm -f {}", self.name)),
                    )
                    .await?;
            }
            None => {}
        }

        let prepared = self.env.prepare().await?;
        tracing::info!(name = %self.name, image = %prepared.image, "starting container");
        let args = format!(
            "run -d --rm --name {}{} {} sleep infinity",
            self.name,
            prepared.volume_flags(),
            prepared.image
        );
        let _ = self
            .expect_ok("docker run", &self.host.docker_command(&args))
            .await?;

        self.wait_until_running().await?;
        *lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Executes a script inside the running container, starting it first
    /// when needed. Calls against one handle are serialized.
    ///
    /// # Errors
    ///
    /// Propagates preparation and transport failures; a script exiting
    /// nonzero is `Ok` with its exit code.
    pub async fn run_script(&self, script_text: &str) -> Result<ScriptResult> {
        self.run_script_with_timeout(script_text, None).await
    }

    /// Like [`run_script`](Self::run_script) with a caller-supplied
    /// deadline.
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
        let _serialized = self.exec_lock.lock().await;
        self.ensure_container().await?;

        let full = script::compose_script(&self.env.schematic().init_commands, script_text);
        let invocation = script::runner_invocation(&full);
        let command = self
            .host
            .docker_command(&format!("exec {} {invocation}", self.name));
        let output = self.executor.run_with_deadline(&command, timeout).await?;
        classify_script_output(&self.host, "docker exec", output)
    }

    /// Copies a local file or directory into the container.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the copy fails.
    pub async fn upload(&self, local: &Path, remote: &Path) -> Result<()> {
        self.ensure_container().await?;
        if let Some(parent) = remote.parent() {
            let _ = self
                .expect_ok(
                    "docker exec mkdir",
                    &self
                        .host
                        .docker_command(&format!("exec {} mkdir -p {}", self.name, parent.display())),
                )
                .await?;
        }
        let _ = self
            .expect_ok(
                "docker cp",
                &self.host.docker_command(&format!(
                    "cp {} {}:{}",
                    local.display(),
                    self.name,
                    remote.display()
                )),
            )
            .await?;
        Ok(())
    }

    /// Copies a file or directory out of the container.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the copy fails.
    pub async fn download(&self, remote: &Path, local: &Path) -> Result<()> {
        self.ensure_container().await?;
        let _ = self
            .expect_ok(
                "docker cp",
                &self.host.docker_command(&format!(
                    "cp {}:{} {}",
                    self.name,
                    remote.display(),
                    local.display()
                )),
            )
            .await?;
        Ok(())
    }

    /// Removes a path inside the container.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the removal fails.
    pub async fn delete(&self, remote: &Path) -> Result<()> {
        self.ensure_container().await?;
        let _ = self
            .expect_ok(
                "docker exec rm",
                &self
                    .host
                    .docker_command(&format!("exec {} rm -rf {}", self.name, remote.display())),
            )
            .await?;
        Ok(())
    }

    /// Stops the container (removed automatically via `--rm`) and resets
    /// the lifecycle so the next script recreates it.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the stop fails for a reason other
    /// than the container already being gone.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let command = self.host.docker_command(&format!("stop {}", self.name));
        let output = self.executor.run(&command).await?;
        if !output.success() && !output.stderr.contains("No such container") {
            return Err(CradleError::Transport {
                op: command,
                detail: output.log(),
            });
        }
        tracing::info!(name = %self.name, "container stopped");
        *lifecycle = Lifecycle::Unstarted;
        Ok(())
    }

    /// Looks up the container's state in `docker ps -a`.
    async fn container_state(&self) -> Result<Option<String>> {
        let command = self
            .host
            .docker_command("ps -a --format '{{json .}}'");
        let output = self.executor.run(&command).await?;
        if !output.success() {
            return Err(CradleError::Transport {
                op: command,
                detail: output.log(),
            });
        }
        for line in output.stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(row) = serde_json::from_str::<serde_json::Value>(line) else {
                continue;
            };
            if row.get("Names").and_then(serde_json::Value::as_str) == Some(self.name.as_str()) {
                return Ok(row
                    .get("State")
                    .and_then(serde_json::Value::as_str)
                    .map(ToOwned::to_owned));
            }
        }
        Ok(None)
    }

    async fn wait_until_running(&self) -> Result<()> {
        for _ in 0..READY_POLL_ATTEMPTS {
            if self.container_state().await?.as_deref() == Some("running") {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
        Err(CradleError::Transport {
            op: format!("waiting for container {}", self.name),
            detail: format!("not running after {READY_POLL_ATTEMPTS} polls"),
        })
    }

    async fn expect_ok(&self, op: &str, command: &str) -> Result<CommandOutput> {
        let output = self.executor.run(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(CradleError::Transport {
                op: op.to_owned(),
                detail: output.log(),
            })
        }
    }
}
