//! Data model for the template lifecycle engine.
//!
//! The registry is the single source of truth for [`TemplateRecord`]s; the
//! provisioner owns the on-disk environment directories the records point at
//! through `environment_handle`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of parameter kinds derivable from a cookiecutter.json value.
///
/// Classification happens in exactly one place
/// ([`classify`](crate::core::schema::classify)); any value shape outside the
/// recognized ones falls back to `String` with a best-effort stringification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Boolean,
    Number,
    Choice,
}

impl ParameterKind {
    /// Returns the kind as a string slice
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Choice => "choice",
        }
    }
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single user-facing parameter mined from a template's cookiecutter.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// The substitution key inside the template
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Default value, stringified; absent for empty choice lists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Allowed values when `kind` is `choice`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    /// Always `true`: cookiecutter.json has no optional marker
    pub required: bool,
    /// Inferred kind
    pub kind: ParameterKind,
}

/// A registered cookiecutter template.
///
/// Invariant: `ready == true` implies `environment_handle` is `Some` and the
/// environment directory contains a cloned checkout of the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    /// Unique registry key
    pub name: String,
    /// Location the template is fetched from
    pub source_url: String,
    /// Description, possibly taken from the template's `_description` key
    pub description: String,
    /// Optional single grouping tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Free-form search tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Root of the provisioned environment, absent until provisioning succeeds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_handle: Option<PathBuf>,
    /// Whether the template has a usable environment
    pub ready: bool,
    /// Last successful provisioning or schema refresh
    pub last_updated: DateTime<Utc>,
    /// Lazily populated parameter schema, invalidated on update
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_schema_cache: Option<Vec<ParameterDescriptor>>,
}

impl TemplateRecord {
    /// Build an unprovisioned record, as returned by template discovery.
    pub fn unprovisioned(
        name: impl Into<String>,
        source_url: impl Into<String>,
        description: impl Into<String>,
        category: Option<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            description: description.into(),
            category,
            tags,
            environment_handle: None,
            ready: false,
            last_updated: Utc::now(),
            parameter_schema_cache: None,
        }
    }
}

/// Request to materialize a project from a registered template.
///
/// Unknown keys in `parameter_values` are passed through to the templating
/// engine unchanged; the engine itself decides whether required fields
/// resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Name of an existing, ready template
    pub template_name: String,
    /// Created if absent
    pub output_directory: PathBuf,
    /// Parameter name to concrete value
    #[serde(default)]
    pub parameter_values: serde_json::Map<String, serde_json::Value>,
}
