//! # cradle-storage
//!
//! Maps logical project ids to filesystem paths.
//!
//! A [`StorageResolver`] answers `locate(id) -> path` from one of several
//! backing stores — a fixed map, a directory of subdirectories, or a tree
//! of sidecar metadata files — and resolvers compose with `+` into an
//! ordered fallback chain. Resolution is lazy: scan-backed variants
//! populate their index on first use and refresh it on [`sync`].
//!
//! [`sync`]: StorageResolver::sync

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod metadata;
mod resolver;

pub use metadata::StorageSidecar;
pub use resolver::StorageResolver;
