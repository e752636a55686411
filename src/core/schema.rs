//! Schema extractor: mines a template's cookiecutter.json into typed
//! parameter descriptors.
//!
//! cookiecutter.json is a flat key-to-value mapping. Keys starting with `_`
//! configure the engine itself and are skipped. Every derived parameter is
//! `required`: the format carries no optional marker, so the safe reading is
//! that the engine needs a value for each key.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::core::error::{Error, Result};
use crate::core::types::{ParameterDescriptor, ParameterKind};

/// The declarative parameter file every cookiecutter template carries
pub const PARAMETER_FILE: &str = "cookiecutter.json";

/// Extract the parameter list from the template rooted at `template_root`.
///
/// Fails with [`Error::SchemaNotFound`] when the parameter file is absent.
/// Descriptors come back in the file's key order.
pub fn extract(template_root: &Path) -> Result<Vec<ParameterDescriptor>> {
    let path = template_root.join(PARAMETER_FILE);
    if !path.exists() {
        return Err(Error::SchemaNotFound(template_root.to_path_buf()));
    }

    let raw = std::fs::read_to_string(&path)?;
    let doc: Value = serde_json::from_str(&raw)?;
    let Some(map) = doc.as_object() else {
        return Err(Error::validation(format!(
            "{} is not a JSON object",
            path.display()
        )));
    };

    let parameters: Vec<ParameterDescriptor> = map
        .iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .map(|(key, value)| classify(key, value))
        .collect();

    debug!(
        template = %template_root.display(),
        count = parameters.len(),
        "extracted parameter schema"
    );
    Ok(parameters)
}

/// Read the template's own `_description` entry, if it has one.
pub fn embedded_description(template_root: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(template_root.join(PARAMETER_FILE)).ok()?;
    let doc: Value = serde_json::from_str(&raw).ok()?;
    doc.get("_description")?.as_str().map(str::to_string)
}

/// Classify one cookiecutter.json value into a parameter descriptor.
///
/// The sole classification point for parameter kinds:
/// - string  -> `String`, default = the value
/// - bool    -> `Boolean`, default = "true"/"false"
/// - number  -> `Number`, default = stringified value
/// - array   -> `Choice`, first element is the default (cookiecutter's own
///   convention); an empty list yields no default
/// - anything else -> `String` with a best-effort stringification
pub fn classify(name: &str, value: &Value) -> ParameterDescriptor {
    let (kind, default_value, choices) = match value {
        Value::String(s) => (ParameterKind::String, Some(s.clone()), None),
        Value::Bool(b) => (ParameterKind::Boolean, Some(b.to_string()), None),
        Value::Number(n) => (ParameterKind::Number, Some(n.to_string()), None),
        Value::Array(items) => {
            let options: Vec<String> = items.iter().map(stringify).collect();
            let default = options.first().cloned();
            (ParameterKind::Choice, default, Some(options))
        }
        other => (ParameterKind::String, Some(stringify(other)), None),
    };

    ParameterDescriptor {
        name: name.to_string(),
        description: describe(name),
        default_value,
        choices,
        required: true,
        kind,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Human-readable description for well-known cookiecutter variable names,
/// with a generic fallback for everything else.
fn describe(name: &str) -> String {
    let builtin = match name {
        "project_name" => "The name of the project",
        "project_slug" => "The slug of the project (used for URLs and file names)",
        "project_short_description" => "A short description of the project",
        "full_name" => "Your full name",
        "email" => "Your email address",
        "github_username" => "Your GitHub username",
        "version" => "The version of the project",
        "command_line_interface" => "The command line interface to use",
        "use_pytest" => "Whether to use pytest for testing",
        "open_source_license" => "The open source license to use",
        _ => return format!("The {}", name.replace('_', " ")),
    };
    builtin.to_string()
}
