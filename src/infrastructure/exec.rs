//! Subprocess execution seam for the lifecycle engine.
//!
//! Every external process the broker touches (git, the Python launcher, the
//! cookiecutter engine inside a virtualenv) goes through the [`CommandRunner`]
//! trait so that the provisioner and materializer can be exercised in tests
//! without network access or a Python toolchain.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::core::error::{Error, Result};

/// Trait for spawning external commands and capturing their output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, optionally in `cwd`, and wait for exit.
    ///
    /// A non-zero exit is not an error at this layer; callers inspect
    /// [`CommandOutput::is_success`] and decide how to classify the failure.
    async fn run(&self, program: &str, args: &[String], cwd: Option<&Path>)
    -> Result<CommandOutput>;
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Check if the command exited zero
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Default runner backed by `tokio::process`
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput> {
        debug!(program, ?args, "spawning command");

        let mut command = Command::new(program);
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| {
            Error::Provisioning(format!("failed to spawn '{program}': {e}"))
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Scripted runner for tests.
///
/// Simulates the side effects the engine relies on: `git clone` materializes
/// a template checkout (with a cookiecutter.json when one is scripted for the
/// URL), `python -m venv` lays down an interpreter stub, and
/// `python -m cookiecutter` produces a project directory under the requested
/// output dir.
#[cfg(test)]
pub struct ScriptedRunner {
    /// cookiecutter.json content per source URL; cloned URLs without an entry
    /// produce a checkout with no parameter file
    pub schemas: std::collections::HashMap<String, serde_json::Value>,
    /// Any command line containing this substring fails with exit 1
    pub fail_matching: Option<String>,
    /// Full command lines observed, in order
    pub calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            schemas: std::collections::HashMap::new(),
            fail_matching: None,
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_schema(mut self, url: &str, schema: serde_json::Value) -> Self {
        self.schemas.insert(url.to_string(), schema);
        self
    }

    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.fail_matching = Some(pattern.to_string());
        self
    }

    pub fn call_count(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }
}

#[cfg(test)]
#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _cwd: Option<&Path>,
    ) -> Result<CommandOutput> {
        let line = format!("{program} {}", args.join(" "));
        self.calls.lock().unwrap().push(line.clone());

        if let Some(pattern) = &self.fail_matching {
            if line.contains(pattern.as_str()) {
                return Ok(CommandOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: format!("scripted failure for '{pattern}'"),
                });
            }
        }

        let ok = |stdout: String| {
            Ok(CommandOutput {
                exit_code: 0,
                stdout,
                stderr: String::new(),
            })
        };

        if program == "git" {
            match args.first().map(String::as_str) {
                Some("clone") => {
                    let url = &args[1];
                    let dest = Path::new(&args[2]);
                    std::fs::create_dir_all(dest)?;
                    if let Some(schema) = self.schemas.get(url) {
                        std::fs::write(
                            dest.join("cookiecutter.json"),
                            serde_json::to_vec_pretty(schema)?,
                        )?;
                    }
                    return ok(String::new());
                }
                Some("-C") => return ok("0123abcd456789\n".to_string()),
                _ => {}
            }
        }

        // Everything else is a python invocation: `<python> -m <module> ...`
        if args.first().map(String::as_str) == Some("-m") {
            match args.get(1).map(String::as_str) {
                Some("venv") => {
                    let venv = Path::new(&args[2]);
                    let bin = venv.join(if cfg!(windows) { "Scripts" } else { "bin" });
                    std::fs::create_dir_all(&bin)?;
                    let python = if cfg!(windows) { "python.exe" } else { "python" };
                    std::fs::write(bin.join(python), b"")?;
                    return ok(String::new());
                }
                Some("pip") => return ok(String::new()),
                Some("cookiecutter") => {
                    let output_dir = args
                        .iter()
                        .position(|a| a == "--output-dir")
                        .and_then(|i| args.get(i + 1))
                        .map(Path::new)
                        .ok_or_else(|| Error::validation("missing --output-dir"))?;
                    let project = output_dir.join("sample_project");
                    std::fs::create_dir_all(&project)?;
                    return ok(format!("Created project at {}\n", project.display()));
                }
                _ => {}
            }
        }

        ok(String::new())
    }
}
