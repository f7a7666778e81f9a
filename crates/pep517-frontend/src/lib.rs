//! A frontend driver for the PEP 517 / PEP 660 build-backend protocol.
//!
//! A [`frontend::Frontend`] spawns a long-lived backend host process, imports the
//! project's declared build backend inside it, and drives sdist/wheel/editable-wheel
//! builds and metadata queries over a line-delimited JSON protocol. Callers almost
//! always want [`subprocess_frontend::SubprocessFrontend`], which adds interpreter
//! resolution and `pyproject.toml` discovery on top.

pub mod error;
mod frontend;
mod metadata_extractor;
mod pipe_reader;
mod project;
mod results;
mod subprocess_frontend;
mod supervisor;
mod wire;

pub use error::{BackendFailure, Error, FrontendError};
pub use frontend::Frontend;
pub use project::{ensure_empty_dir, ProjectDescriptor};
pub use results::{ArtifactResult, MetadataResult, OptionalHooks, RequiresResult};
pub use subprocess_frontend::SubprocessFrontend;
