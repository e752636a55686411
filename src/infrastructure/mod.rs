//! Infrastructure collaborators: subprocess execution and catalog storage.

pub mod db;
pub mod exec;

pub use db::Catalog;
pub use exec::{CommandOutput, CommandRunner, ProcessRunner};
