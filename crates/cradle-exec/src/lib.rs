//! # cradle-exec
//!
//! Turns a composed schematic into running containers.
//!
//! Handles:
//! - **Script**: binary-safe transport encoding for arbitrary script
//!   content.
//! - **Placement**: where caches and synchronized directories land on the
//!   execution host.
//! - **Env**: the transient environment — one container per script, with
//!   single-flight build + sync preparation.
//! - **Persistent**: a named long-lived container reused across scripts,
//!   with upload/download/delete and stop/recreate semantics.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod env;
pub mod persistent;
pub mod placement;
pub mod script;

pub use env::{BindMount, DockerEnv, PreparedEnv};
pub use persistent::PersistentEnv;
pub use placement::HostPlacement;
