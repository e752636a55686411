//! Registry and execution broker for cookiecutter project templates.
//!
//! Templar keeps a catalog of third-party cookiecutter templates, provisions
//! an isolated Python virtualenv per template, mines each template's
//! `cookiecutter.json` into a typed parameter schema, and replays the
//! templating engine inside that environment to materialize new projects.
//! The whole surface is exposed over a JSON-RPC stdio transport so that
//! AI-assisted clients can drive it programmatically.
//!
//! # Architecture
//!
//! - [`core`] — the lifecycle engine: registry, environment provisioner,
//!   schema extractor, project materializer, and the orchestrator that
//!   composes them into the register/generate workflows.
//! - [`infrastructure`] — subprocess execution and the SQLite catalog.
//! - [`rpc`] — thin JSON-RPC 2.0 framing over stdio.
//! - [`config`] — environment-derived directory and database locations.

pub mod config;
pub mod core;
pub mod infrastructure;
pub mod rpc;

pub use crate::core::error::{Error, Result};
