//! Incremental directory synchronization to the execution host.
//!
//! Wraps the external `rsync` binary: incremental transfer, exclusion
//! patterns, and mirroring (`--delete`) so the destination exactly tracks
//! the source. Concurrent transfers are capped by a shared semaphore.

use std::path::PathBuf;
use std::sync::Arc;

use cradle_common::error::{CradleError, Result};
use tokio::sync::Semaphore;

use crate::host::DockerHost;
use crate::process::CommandExecutor;

/// Maximum concurrent rsync transfers.
const MAX_CONCURRENT_TRANSFERS: usize = 3;

/// One directory transfer.
#[derive(Debug, Clone)]
pub struct SyncJob {
    /// Local source directory.
    pub src: PathBuf,
    /// Destination path on the execution host.
    pub dest: PathBuf,
    /// Patterns excluded from the transfer.
    pub excludes: Vec<String>,
    /// Whether stale destination files are deleted to mirror the source.
    pub delete: bool,
}

/// Runs sync jobs against one execution host.
#[derive(Debug)]
pub struct SyncRunner {
    host: DockerHost,
    executor: Arc<dyn CommandExecutor>,
    semaphore: Arc<Semaphore>,
}

impl SyncRunner {
    /// Creates a runner for the given host.
    #[must_use]
    pub fn new(host: DockerHost, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            host,
            executor,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_TRANSFERS)),
        }
    }

    /// Ensures a directory exists on the execution host.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the directory cannot be created.
    pub async fn ensure_dir(&self, path: &PathBuf) -> Result<()> {
        let cmd = self.host.shell_command(&format!("mkdir -p {}", path.display()));
        let output = self.executor.run(&cmd).await?;
        if output.success() {
            Ok(())
        } else {
            Err(CradleError::Transport {
                op: cmd,
                detail: output.log(),
            })
        }
    }

    /// Synchronizes one directory to the execution host, creating the
    /// destination first.
    ///
    /// # Errors
    ///
    /// Returns [`CradleError::SyncFailed`] carrying the transfer log on
    /// nonzero rsync exit.
    pub async fn run(&self, job: &SyncJob) -> Result<()> {
        let _permit = self.semaphore.acquire().await.map_err(|e| CradleError::Transport {
            op: "sync permit".to_owned(),
            detail: e.to_string(),
        })?;

        self.ensure_dir(&job.dest).await?;

        let dest = self.host.sync_destination(&job.dest);
        let mut cmd = String::from("rsync -a");
        if job.delete {
            cmd.push_str(" --delete");
        }
        for pattern in &job.excludes {
            cmd.push_str(&format!(" --exclude='{pattern}'"));
        }
        cmd.push_str(&format!(" {}/ {dest}/", job.src.display()));

        tracing::info!(src = %job.src.display(), %dest, "syncing directory");
        let output = self.executor.run(&cmd).await?;
        if output.success() {
            Ok(())
        } else {
            Err(CradleError::SyncFailed {
                src: job.src.display().to_string(),
                dst: dest,
                log: output.log(),
            })
        }
    }
}
