//! Environment provisioner: one isolated Python virtualenv per template.
//!
//! Isolation exists so that each template's cookiecutter dependency (version,
//! plugins) cannot collide with another template's. `create` follows a
//! destroy-then-recreate policy: re-adding a template never reuses a partial
//! install, at the cost of re-fetching everything on update.
//!
//! Environment layout, exclusively owned by whichever record references it:
//!
//! ```text
//! <envs_dir>/<handle>/venv/       Python virtualenv with cookiecutter installed
//! <envs_dir>/<handle>/template/   git checkout of the template source
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::error::{Error, Result};
use crate::infrastructure::exec::CommandRunner;

/// Opaque reference to a provisioned environment
#[derive(Debug, Clone)]
pub struct EnvironmentRef {
    handle: String,
    root: PathBuf,
}

impl EnvironmentRef {
    pub(crate) fn new(handle: impl Into<String>, root: PathBuf) -> Self {
        Self {
            handle: handle.into(),
            root,
        }
    }

    /// The handle this environment was allocated under (the template name)
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Root directory of the environment
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The virtualenv directory
    pub fn venv_dir(&self) -> PathBuf {
        self.root.join("venv")
    }

    /// The template checkout directory
    pub fn template_dir(&self) -> PathBuf {
        self.root.join("template")
    }

    /// Interpreter inside the virtualenv
    pub fn python_path(&self) -> PathBuf {
        if cfg!(windows) {
            self.venv_dir().join("Scripts").join("python.exe")
        } else {
            self.venv_dir().join("bin").join("python")
        }
    }
}

/// Host interpreter used to bootstrap virtualenvs
fn python_launcher() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

/// Creates, populates, and destroys isolated runtime environments.
///
/// The provisioner keeps no index of its own; environments are addressed by
/// the handle the orchestration layer supplies.
pub struct EnvironmentProvisioner {
    envs_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl EnvironmentProvisioner {
    pub fn new(envs_dir: PathBuf, runner: Arc<dyn CommandRunner>) -> Self {
        Self { envs_dir, runner }
    }

    /// Address an environment by handle without touching the filesystem.
    pub fn env_ref(&self, handle: &str) -> EnvironmentRef {
        EnvironmentRef::new(handle, self.envs_dir.join(handle))
    }

    /// Allocate a fresh environment for `handle`.
    ///
    /// Any existing environment at the same handle is destroyed first, so the
    /// caller always gets a clean slate. Fails with [`Error::Provisioning`]
    /// when the virtualenv or the engine install cannot be completed.
    pub async fn create(&self, handle: &str) -> Result<EnvironmentRef> {
        let env = self.env_ref(handle);
        self.destroy(&env).await?;

        debug!(handle, root = %env.root().display(), "creating environment");
        tokio::fs::create_dir_all(env.root())
            .await
            .map_err(|e| Error::Provisioning(format!("failed to create {}: {e}", env.root().display())))?;

        let venv = env.venv_dir().to_string_lossy().to_string();
        let output = self
            .runner
            .run(python_launcher(), &["-m".into(), "venv".into(), venv], None)
            .await?;
        if !output.is_success() {
            self.rollback(&env).await;
            return Err(Error::Provisioning(format!(
                "failed to create virtualenv for '{handle}': {}",
                output.stderr
            )));
        }

        if let Err(e) = self.run(&env, "pip", &["install".into(), "cookiecutter".into()]).await {
            self.rollback(&env).await;
            return Err(Error::Provisioning(format!(
                "failed to install cookiecutter for '{handle}': {e}"
            )));
        }

        info!(handle, "environment provisioned");
        Ok(env)
    }

    /// Run `python -m <module> <args>` inside the environment's virtualenv.
    ///
    /// This is the only way the rest of the system touches the environment's
    /// installed tooling. Returns stdout on success; a non-zero exit surfaces
    /// as [`Error::Execution`] with the captured stderr.
    pub async fn run(&self, env: &EnvironmentRef, module: &str, args: &[String]) -> Result<String> {
        let python = env.python_path();
        if !python.exists() {
            return Err(Error::Provisioning(format!(
                "no python interpreter in environment {}",
                env.root().display()
            )));
        }

        let mut argv = vec!["-m".to_string(), module.to_string()];
        argv.extend_from_slice(args);

        let output = self
            .runner
            .run(&python.to_string_lossy(), &argv, None)
            .await?;
        if output.is_success() {
            Ok(output.stdout)
        } else {
            Err(Error::Execution {
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }

    /// Remove all files associated with the environment.
    ///
    /// Idempotent: a missing environment is a no-op, not an error.
    pub async fn destroy(&self, env: &EnvironmentRef) -> Result<()> {
        match tokio::fs::remove_dir_all(env.root()).await {
            Ok(()) => {
                debug!(handle = env.handle(), "environment destroyed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Provisioning(format!(
                "failed to remove environment {}: {e}",
                env.root().display()
            ))),
        }
    }

    /// Clone the template source into the environment's checkout directory.
    ///
    /// Uses the host git, not the virtualenv; the virtualenv only carries the
    /// templating engine.
    pub async fn clone_template(&self, env: &EnvironmentRef, url: &str) -> Result<()> {
        let dest = env.template_dir().to_string_lossy().to_string();
        let output = self
            .runner
            .run("git", &["clone".into(), url.into(), dest], None)
            .await?;
        if output.is_success() {
            Ok(())
        } else {
            Err(Error::Execution {
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }

    /// Commit hash of the environment's template checkout.
    pub async fn git_head(&self, env: &EnvironmentRef) -> Result<String> {
        let checkout = env.template_dir().to_string_lossy().to_string();
        let output = self
            .runner
            .run(
                "git",
                &["-C".into(), checkout, "rev-parse".into(), "HEAD".into()],
                None,
            )
            .await?;
        if output.is_success() {
            Ok(output.stdout.trim().to_string())
        } else {
            Err(Error::Execution {
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }

    async fn rollback(&self, env: &EnvironmentRef) {
        if let Err(e) = self.destroy(env).await {
            warn!(handle = env.handle(), error = %e, "rollback of partial environment failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::exec::ScriptedRunner;
    use tempfile::tempdir;

    fn provisioner(dir: &Path, runner: ScriptedRunner) -> EnvironmentProvisioner {
        EnvironmentProvisioner::new(dir.to_path_buf(), Arc::new(runner))
    }

    #[tokio::test]
    async fn test_create_lays_down_interpreter() {
        let dir = tempdir().unwrap();
        let prov = provisioner(dir.path(), ScriptedRunner::new());

        let env = prov.create("pypackage").await.unwrap();

        assert!(env.python_path().exists());
        assert_eq!(env.handle(), "pypackage");
        assert_eq!(env.root(), dir.path().join("pypackage"));
    }

    #[tokio::test]
    async fn test_create_replaces_existing_environment() {
        let dir = tempdir().unwrap();
        let prov = provisioner(dir.path(), ScriptedRunner::new());

        let env = prov.create("x").await.unwrap();
        let marker = env.root().join("stale-file");
        std::fs::write(&marker, b"old").unwrap();

        prov.create("x").await.unwrap();
        assert!(!marker.exists(), "recreate must start from a clean slate");
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_install_failure() {
        let dir = tempdir().unwrap();
        let prov = provisioner(dir.path(), ScriptedRunner::new().failing_on("pip install"));

        let err = prov.create("broken").await.unwrap_err();

        assert!(matches!(err, Error::Provisioning(_)));
        assert!(err.to_string().contains("cookiecutter"));
        assert!(
            !dir.path().join("broken").exists(),
            "partial environment must be removed"
        );
    }

    #[tokio::test]
    async fn test_run_surfaces_nonzero_exit_as_execution_error() {
        let dir = tempdir().unwrap();
        let prov = provisioner(dir.path(), ScriptedRunner::new().failing_on("-m cookiecutter"));

        // the pattern spares `pip install cookiecutter`, so create succeeds
        let env = prov.create("x").await.unwrap();
        let err = prov
            .run(&env, "cookiecutter", &["--help".into()])
            .await
            .unwrap_err();

        match err {
            Error::Execution { exit_code, stderr } => {
                assert_eq!(exit_code, 1);
                assert!(stderr.contains("cookiecutter"));
            }
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_without_interpreter_is_provisioning_error() {
        let dir = tempdir().unwrap();
        let prov = provisioner(dir.path(), ScriptedRunner::new());

        let env = prov.env_ref("never-created");
        let err = prov.run(&env, "pip", &["list".into()]).await.unwrap_err();

        assert!(matches!(err, Error::Provisioning(_)));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let dir = tempdir().unwrap();
        let prov = provisioner(dir.path(), ScriptedRunner::new());

        let env = prov.create("x").await.unwrap();
        prov.destroy(&env).await.unwrap();
        // second destroy of a missing environment is a no-op
        prov.destroy(&env).await.unwrap();
        assert!(!env.root().exists());
    }

    #[tokio::test]
    async fn test_clone_template_populates_checkout() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new()
            .with_schema("https://h/cookiecutter-x", serde_json::json!({"a": "b"}));
        let prov = provisioner(dir.path(), runner);

        let env = prov.create("x").await.unwrap();
        prov.clone_template(&env, "https://h/cookiecutter-x")
            .await
            .unwrap();

        assert!(env.template_dir().join("cookiecutter.json").exists());
        let head = prov.git_head(&env).await.unwrap();
        assert_eq!(head, "0123abcd456789");
    }
}
