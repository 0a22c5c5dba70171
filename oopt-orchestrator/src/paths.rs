use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_GIT_DIR: &str = "/etc/oopt";
pub const DEFAULT_BACKEND_DIR: &str = "/var/run/oopt/db";

pub use oopt_core::revisions::TEMPLATES_DIR;

pub const MANIFESTS_DIR: &str = "manifests";

pub const KUBECTL: &str = "kubectl";

/// Fallback wait for the state DB when the settings ask for none.
pub const MIN_READY_TIMEOUT: Duration = Duration::from_secs(1);

/// Rendered pod manifests and config maps live here.
pub fn manifests_dir(git_dir: &Path) -> PathBuf {
    git_dir.join(MANIFESTS_DIR)
}

/// User template overrides, if the directory exists.
pub fn templates_dir(git_dir: &Path) -> PathBuf {
    git_dir.join(TEMPLATES_DIR)
}

pub fn config_map_file(name: &str) -> String {
    format!("{name}-configmap.yml")
}
