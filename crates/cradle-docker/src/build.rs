//! Image builds against the configured docker endpoint.

use std::sync::Arc;

use cradle_common::error::{CradleError, Result};
use cradle_common::types::{HostTarget, ImageRef};
use cradle_schematic::ContainerSchematic;

use crate::context;
use crate::host::DockerHost;
use crate::process::CommandExecutor;

/// Knobs for a single build invocation.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Whether layer caching is allowed.
    pub use_cache: bool,
    /// Whether to push the tag after a successful build.
    pub push: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { use_cache: true, push: false }
    }
}

/// Translates a schematic's build steps into an image on one endpoint.
///
/// The schematic stays host-agnostic; the endpoint comes from
/// configuration via the [`DockerHost`].
#[derive(Debug)]
pub struct ImageBuilder {
    host: DockerHost,
    executor: Arc<dyn CommandExecutor>,
    debug_build: bool,
}

impl ImageBuilder {
    /// Creates a builder for the given endpoint.
    #[must_use]
    pub fn new(host: DockerHost, executor: Arc<dyn CommandExecutor>, debug_build: bool) -> Self {
        Self { host, executor, debug_build }
    }

    /// Stages the build context and builds `tag` from it.
    ///
    /// For ssh-addressed endpoints, the context is first transferred to a
    /// unique remote temp directory, which is always removed afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`CradleError::BuildFailed`] carrying the captured build
    /// log on nonzero exit, and transport/sync errors when the context
    /// cannot reach the endpoint. No partial image is reported as success.
    pub async fn build(
        &self,
        schematic: &ContainerSchematic,
        tag: &str,
        options: &BuildOptions,
    ) -> Result<ImageRef> {
        let staged = context::stage(schematic, self.executor.as_ref()).await?;
        tracing::info!(tag, host = %self.host.target(), "building image");

        let cache_flag = if options.use_cache { "" } else { " --no-cache" };
        match self.host.target() {
            HostTarget::Local | HostTarget::Context(_) => {
                let cmd = self.host.docker_command(&format!(
                    "build{cache_flag} -t {tag} {}",
                    staged.dir().display()
                ));
                self.run_build(&cmd, tag).await?;
            }
            HostTarget::Ssh(ssh_host) => {
                self.build_over_ssh(ssh_host, &staged, tag, cache_flag).await?;
            }
        }

        if self.debug_build {
            let _ = self
                .executor
                .run(&self.host.docker_command(&format!("history {tag}")))
                .await?;
        }
        if options.push {
            tracing::info!(tag, "pushing image");
            self.run_build(&self.host.docker_command(&format!("push {tag}")), tag)
                .await?;
        }
        Ok(ImageRef::new(tag))
    }

    async fn build_over_ssh(
        &self,
        ssh_host: &str,
        staged: &context::StagedContext,
        tag: &str,
        cache_flag: &str,
    ) -> Result<()> {
        let remote_context = format!(
            "/tmp/cradle-build-{}",
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let transfer = self
            .executor
            .run(&format!(
                "rsync -az {}/ {ssh_host}:{remote_context}/",
                staged.dir().display()
            ))
            .await?;
        if !transfer.success() {
            return Err(CradleError::SyncFailed {
                src: staged.dir().display().to_string(),
                dst: format!("{ssh_host}:{remote_context}"),
                log: transfer.log(),
            });
        }

        let build_cmd = format!("ssh {ssh_host} 'docker build{cache_flag} -t {tag} {remote_context}'");
        let build_result = self.run_build(&build_cmd, tag).await;

        // The remote context is removed whether or not the build succeeded.
        let cleanup = self
            .executor
            .run(&format!("ssh {ssh_host} 'rm -rf {remote_context}'"))
            .await;
        if let Err(err) = cleanup {
            tracing::warn!(%remote_context, %err, "remote context cleanup failed");
        }
        build_result
    }

    async fn run_build(&self, command: &str, tag: &str) -> Result<()> {
        let output = self.executor.run(command).await?;
        if output.success() {
            Ok(())
        } else {
            Err(CradleError::BuildFailed {
                tag: tag.to_owned(),
                log: output.log(),
            })
        }
    }
}
