//! Global configuration model for the Cradle runtime.
//!
//! There is no process-wide mutable configuration: a [`CradleConfig`] is
//! resolved once — explicit argument > `CRADLE_*` environment variable >
//! built-in default — and passed by value into the constructors that need
//! it.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::types::HostTarget;

/// Root configuration for composing and executing environments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CradleConfig {
    /// Base image used when a schematic does not name one explicitly.
    pub base_image: String,
    /// Python version installed by the pyenv component.
    pub python_version: String,
    /// Repository prefix for image tags derived from project ids.
    pub image_repo: String,
    /// Docker endpoint that receives build and run operations.
    pub host: HostTarget,
    /// Host-side root under which cache/source/resource directories live.
    pub host_root: PathBuf,
    /// Whether to run `docker history` after successful builds.
    pub debug_build: bool,
}

impl Default for CradleConfig {
    fn default() -> Self {
        Self {
            base_image: constants::DEFAULT_BASE_IMAGE.to_owned(),
            python_version: constants::DEFAULT_PYTHON_VERSION.to_owned(),
            image_repo: constants::DEFAULT_IMAGE_REPO.to_owned(),
            host: HostTarget::Local,
            host_root: PathBuf::from(constants::DEFAULT_HOST_ROOT),
            debug_build: false,
        }
    }
}

impl CradleConfig {
    /// Builds a configuration snapshot from the current process
    /// environment, falling back to built-in defaults.
    ///
    /// An ssh host takes precedence over a named context when both are
    /// set, since it is the more explicit endpoint selection.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(&env::vars().collect())
    }

    /// Builds a configuration from an explicit variable map.
    ///
    /// Split out from [`from_env`](Self::from_env) so tests can exercise
    /// precedence without touching process state.
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        let host = if let Some(ssh) = vars.get(constants::ENV_DOCKER_SSH_HOST) {
            HostTarget::Ssh(ssh.clone())
        } else if let Some(ctx) = vars.get(constants::ENV_DOCKER_CONTEXT) {
            HostTarget::Context(ctx.clone())
        } else {
            HostTarget::Local
        };
        Self {
            base_image: vars
                .get(constants::ENV_BASE_IMAGE)
                .cloned()
                .unwrap_or(defaults.base_image),
            python_version: vars
                .get(constants::ENV_PYTHON_VERSION)
                .cloned()
                .unwrap_or(defaults.python_version),
            image_repo: vars
                .get(constants::ENV_IMAGE_REPO)
                .cloned()
                .unwrap_or(defaults.image_repo),
            host,
            host_root: vars
                .get(constants::ENV_HOST_ROOT)
                .map_or(defaults.host_root, PathBuf::from),
            debug_build: vars
                .get(constants::ENV_DEBUG_BUILD)
                .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
        }
    }

    /// Returns the default image tag for a project id.
    #[must_use]
    pub fn image_tag_for(&self, project_id: &str) -> String {
        format!("{}/{}", self.image_repo, project_id.to_lowercase())
    }
}
