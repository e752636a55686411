//! Error handling for the template lifecycle engine.
//!
//! This module defines the error taxonomy shared by every layer of the
//! broker, along with a convenient `Result` alias. Component-level failures
//! are never swallowed: they propagate to the orchestrator, which attaches
//! workflow context before surfacing them to the transport.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for template lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for template lifecycle operations
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown template name
    #[error("template '{0}' not found")]
    NotFound(String),

    /// Environment creation or destruction failure
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// A command inside an environment exited non-zero
    #[error("command exited with status {exit_code}: {stderr}")]
    Execution { exit_code: i32, stderr: String },

    /// Template lacks a declarative parameter file
    #[error("no cookiecutter.json found under {0}")]
    SchemaNotFound(PathBuf),

    /// Generation attempted against an unprovisioned template
    #[error("template '{0}' has no provisioned environment")]
    TemplateNotReady(String),

    /// The templating engine invocation failed
    #[error("project generation failed: {stderr}")]
    Generation { stderr: String },

    /// Malformed request parameters at the boundary
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catalog persistence error
    #[error("catalog error: {0}")]
    Persistence(String),
}

impl Error {
    /// Create a new provisioning error
    pub fn provisioning<S: Into<String>>(msg: S) -> Self {
        Self::Provisioning(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable kind, used by progress events and the
    /// JSON-RPC error payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Provisioning(_) => "provisioning",
            Self::Execution { .. } => "execution",
            Self::SchemaNotFound(_) => "schema_not_found",
            Self::TemplateNotReady(_) => "template_not_ready",
            Self::Generation { .. } => "generation",
            Self::Validation(_) => "validation",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
