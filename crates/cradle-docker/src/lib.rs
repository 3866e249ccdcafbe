//! # cradle-docker
//!
//! Control-plane plumbing for a docker-compatible CLI.
//!
//! Handles:
//! - **Process**: async shell execution with captured output and the
//!   executor seam tests hook into.
//! - **Host**: command construction for local, named-context, and
//!   ssh-addressed docker endpoints.
//! - **Context**: staging a schematic's build steps into a build context.
//! - **Build**: turning a staged context into an image on the target host.
//! - **Rsync**: incremental directory synchronization to the execution
//!   host.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod build;
pub mod context;
pub mod host;
pub mod process;
pub mod rsync;

pub use build::{BuildOptions, ImageBuilder};
pub use host::DockerHost;
pub use process::{CommandExecutor, CommandOutput, RecordingExecutor, SystemExecutor};
pub use rsync::{SyncJob, SyncRunner};
