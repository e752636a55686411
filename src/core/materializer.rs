//! Project materializer: replays the templating engine inside a template's
//! environment to produce a concrete project tree.
//!
//! Parameter values are handed to cookiecutter through a transient JSON
//! config file held in a [`tempfile::NamedTempFile`], which is removed on
//! every exit path when the guard drops. The operation is all-or-nothing
//! from the caller's perspective; if the engine fails partway through its
//! own writes, no cleanup of the partial tree is attempted, since those
//! writes are outside this system's control.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::core::environment::{EnvironmentProvisioner, EnvironmentRef};
use crate::core::error::{Error, Result};
use crate::core::types::TemplateRecord;

/// Marker line cookiecutter prints for the generated project directory
const CREATED_AT_PREFIX: &str = "Created project at ";

/// Runs the templating engine inside a template's provisioned environment
pub struct ProjectMaterializer {
    provisioner: Arc<EnvironmentProvisioner>,
}

impl ProjectMaterializer {
    pub fn new(provisioner: Arc<EnvironmentProvisioner>) -> Self {
        Self { provisioner }
    }

    /// Materialize a project from `record` into `output_dir`.
    ///
    /// Requires `record.ready`; nothing is written under `output_dir` before
    /// that check passes. Returns the path of the generated project.
    pub async fn materialize(
        &self,
        record: &TemplateRecord,
        output_dir: &Path,
        values: &serde_json::Map<String, Value>,
    ) -> Result<PathBuf> {
        if !record.ready {
            return Err(Error::TemplateNotReady(record.name.clone()));
        }
        let env_root = record
            .environment_handle
            .clone()
            .ok_or_else(|| Error::TemplateNotReady(record.name.clone()))?;
        let env = EnvironmentRef::new(record.name.clone(), env_root);

        tokio::fs::create_dir_all(output_dir).await?;

        // Dropped on every exit path, success or failure.
        let mut config = tempfile::NamedTempFile::new()?;
        serde_json::to_writer(&mut config, &Value::Object(values.clone()))?;
        config.flush()?;

        let args = vec![
            env.template_dir().to_string_lossy().to_string(),
            "--no-input".to_string(),
            "--output-dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--config-file".to_string(),
            config.path().to_string_lossy().to_string(),
        ];

        debug!(template = %record.name, output = %output_dir.display(), "invoking engine");
        let stdout = self
            .provisioner
            .run(&env, "cookiecutter", &args)
            .await
            .map_err(|e| match e {
                Error::Execution { stderr, .. } => Error::Generation { stderr },
                other => other,
            })?;

        let project_path = resolve_output_path(output_dir, values, &stdout);
        info!(
            template = %record.name,
            project = %project_path.display(),
            "project generated"
        );
        Ok(project_path)
    }
}

/// Best-effort resolution of the generated project directory: an explicit
/// `project_slug` value wins, then the path the engine reports on stdout,
/// then the output directory itself.
fn resolve_output_path(
    output_dir: &Path,
    values: &serde_json::Map<String, Value>,
    stdout: &str,
) -> PathBuf {
    if let Some(slug) = values.get("project_slug").and_then(Value::as_str) {
        return output_dir.join(slug);
    }
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix(CREATED_AT_PREFIX) {
            return PathBuf::from(rest.trim());
        }
    }
    output_dir.to_path_buf()
}
