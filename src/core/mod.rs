//! Template lifecycle and isolated execution engine.
//!
//! The engine registers cookiecutter templates, provisions an isolated
//! virtualenv per template, mines each template's parameter schema, and
//! replays the engine inside that environment to materialize projects.
//! Everything outside this module (RPC framing, CLI, catalog storage) is
//! thin plumbing around these components.

pub mod environment;
pub mod error;
pub mod materializer;
pub mod orchestrator;
pub mod registry;
pub mod schema;
pub mod types;

pub use environment::{EnvironmentProvisioner, EnvironmentRef};
pub use error::{Error, Result};
pub use materializer::ProjectMaterializer;
pub use orchestrator::{LifecycleOrchestrator, ProgressSink, TracingSink};
pub use registry::TemplateRegistry;
pub use types::{GenerationRequest, ParameterDescriptor, ParameterKind, TemplateRecord};
