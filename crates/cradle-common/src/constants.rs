//! System-wide constants and default paths.

/// Default base image for composed environments.
pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:22.04";

/// Default python version installed by the pyenv component.
pub const DEFAULT_PYTHON_VERSION: &str = "3.12";

/// Default repository prefix for image tags derived from project ids.
pub const DEFAULT_IMAGE_REPO: &str = "cradle";

/// In-container path of the installed script runner.
pub const RUNNER_PATH: &str = "/usr/local/bin/cradle-runner.sh";

/// Default in-container root for synchronized project sources.
pub const DEFAULT_SOURCES_ROOT: &str = "/sources";

/// Default in-container root for synchronized resources.
pub const DEFAULT_RESOURCES_ROOT: &str = "/resources";

/// Default host-side root under which cache, source, and resource
/// directories are placed on the execution host.
pub const DEFAULT_HOST_ROOT: &str = "/tmp/cradle";

/// File name of the storage sidecar metadata file.
pub const STORAGE_SIDECAR: &str = ".cradle-storage.yaml";

/// Environment variable overriding the default base image.
pub const ENV_BASE_IMAGE: &str = "CRADLE_BASE_IMAGE";

/// Environment variable overriding the default python version.
pub const ENV_PYTHON_VERSION: &str = "CRADLE_PYTHON_VERSION";

/// Environment variable overriding the image tag repository prefix.
pub const ENV_IMAGE_REPO: &str = "CRADLE_IMAGE_REPO";

/// Environment variable selecting a named docker context.
pub const ENV_DOCKER_CONTEXT: &str = "CRADLE_DOCKER_CONTEXT";

/// Environment variable selecting an ssh-addressed docker host.
pub const ENV_DOCKER_SSH_HOST: &str = "CRADLE_DOCKER_SSH_HOST";

/// Environment variable overriding the host-side placement root.
pub const ENV_HOST_ROOT: &str = "CRADLE_HOST_ROOT";

/// Environment variable enabling build diagnostics (`docker history`).
pub const ENV_DEBUG_BUILD: &str = "CRADLE_DEBUG_BUILD";

/// Application name used in CLI output.
pub const APP_NAME: &str = "cradle";
