//! [`ProcessOrchestrator`] backed by `kubectl`.
//!
//! Manifests are written under the manifest directory and handed to
//! `kubectl` by path. In dry-run mode the manifests are still written but no
//! command is executed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{io_err, OrchestratorError};
use crate::paths::{config_map_file, KUBECTL};
use crate::process::ProcessOrchestrator;

pub struct KubectlOrchestrator {
    manifest_dir: PathBuf,
    program: String,
    dry_run: bool,
}

impl KubectlOrchestrator {
    pub fn new(manifest_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_dir: manifest_dir.into(),
            program: KUBECTL.to_owned(),
            dry_run: false,
        }
    }

    /// Use another executable in place of `kubectl`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn manifest_dir(&self) -> &Path {
        &self.manifest_dir
    }

    fn write_manifest(&self, file_name: &str, text: &str) -> Result<PathBuf, OrchestratorError> {
        fs::create_dir_all(&self.manifest_dir).map_err(|e| io_err(&self.manifest_dir, e))?;
        let path = self.manifest_dir.join(file_name);
        let tmp = path.with_extension("yml.tmp");
        fs::write(&tmp, text).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        debug!(path = %path.display(), "manifest written");
        Ok(path)
    }

    /// Run the program with `args` and return its stdout.
    fn run(&self, args: &[&str], ignore_failure: bool) -> Result<String, OrchestratorError> {
        if self.dry_run {
            info!(command = %format!("{} {}", self.program, args.join(" ")), "dry run");
            return Ok(String::new());
        }

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| io_err(&self.program, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() || ignore_failure {
            return Ok(stdout);
        }

        Err(OrchestratorError::Command {
            program: format!("{} {}", self.program, args.join(" ")),
            status: output.status.to_string(),
            stdout: stdout.trim().to_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }

    /// Whether `kubectl get <kind> <name>` finds the object. Nothing exists
    /// in dry-run mode.
    fn exists(&self, kind: &str, name: &str) -> Result<bool, OrchestratorError> {
        if self.dry_run {
            return Ok(false);
        }
        let output = Command::new(&self.program)
            .args(["get", kind, name])
            .output()
            .map_err(|e| io_err(&self.program, e))?;
        Ok(output.status.success())
    }

    fn delete_pod(&self, pod: &str) -> Result<(), OrchestratorError> {
        if !self.exists("pod", pod)? {
            debug!(pod, "not running");
            return Ok(());
        }
        self.run(&["delete", "pod", pod, "--grace-period=0", "--force"], false)?;
        info!(pod, "pod deleted");
        Ok(())
    }
}

impl ProcessOrchestrator for KubectlOrchestrator {
    fn apply_config_map(&mut self, name: &str, manifest: &str) -> Result<(), OrchestratorError> {
        let path = self.write_manifest(&config_map_file(name), manifest)?;
        let path = path.to_string_lossy();
        let verb = if self.exists("cm", name)? { "replace" } else { "create" };
        self.run(&[verb, "-f", &path], false)?;
        info!(config_map = name, verb, "config map applied");
        Ok(())
    }

    fn restart(&mut self, pod: &str, manifest: &str) -> Result<(), OrchestratorError> {
        self.delete_pod(pod)?;
        let path = self.write_manifest(&format!("{pod}.yml"), manifest)?;
        self.run(&["create", "-f", &path.to_string_lossy()], false)?;
        info!(pod, "pod created");
        Ok(())
    }

    fn wait_ready(&mut self, pod: &str, timeout: Duration) -> Result<(), OrchestratorError> {
        let target = format!("pod/{pod}");
        let timeout_arg = format!("--timeout={}s", timeout.as_secs());
        match self.run(&["wait", "--for=condition=Ready", &target, &timeout_arg], false) {
            Ok(_) => {
                info!(pod, "pod ready");
                Ok(())
            }
            Err(OrchestratorError::Command { .. }) => Err(OrchestratorError::NotReady {
                pod: pod.to_owned(),
                timeout_secs: timeout.as_secs(),
            }),
            Err(e) => Err(e),
        }
    }

    fn stop(&mut self, pod: &str) -> Result<(), OrchestratorError> {
        self.delete_pod(pod)
    }

    fn status(&mut self) -> Result<String, OrchestratorError> {
        self.run(&["get", "pod"], false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn dry_run_writes_manifests_without_running() {
        let dir = TempDir::new().expect("tempdir");
        let mut kubectl = KubectlOrchestrator::new(dir.path().join("manifests"))
            .with_program("/nonexistent/kubectl")
            .dry_run(true);

        kubectl.restart("redis", "kind: Pod\n").expect("restart");
        kubectl.apply_config_map("sonic-config", "kind: ConfigMap\n").expect("config map");
        kubectl.wait_ready("redis", Duration::from_secs(1)).expect("wait");
        kubectl.stop("redis").expect("stop");
        assert_eq!(kubectl.status().expect("status"), "");

        let pod = fs::read_to_string(dir.path().join("manifests/redis.yml")).expect("pod manifest");
        assert_eq!(pod, "kind: Pod\n");
        assert!(dir.path().join("manifests/sonic-config-configmap.yml").exists());
        assert!(!dir.path().join("manifests/redis.yml.tmp").exists());
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let dir = TempDir::new().expect("tempdir");
        let mut kubectl = KubectlOrchestrator::new(dir.path()).with_program("/nonexistent/kubectl");
        assert!(matches!(kubectl.status(), Err(OrchestratorError::Io { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_its_output() {
        let dir = TempDir::new().expect("tempdir");
        let mut kubectl = KubectlOrchestrator::new(dir.path()).with_program("false");
        let err = kubectl.status().expect_err("false never succeeds");
        match err {
            OrchestratorError::Command { program, .. } => assert_eq!(program, "false get pod"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn wait_failure_is_not_ready() {
        let dir = TempDir::new().expect("tempdir");
        let mut kubectl = KubectlOrchestrator::new(dir.path()).with_program("false");
        assert!(matches!(
            kubectl.wait_ready("redis", Duration::from_secs(5)),
            Err(OrchestratorError::NotReady { timeout_secs: 5, .. })
        ));
    }
}
