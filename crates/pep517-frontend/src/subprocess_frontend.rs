//! Concrete [`Frontend`] bound to a locally available `python3`/`python` interpreter.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::frontend::Frontend;
use crate::project::ProjectDescriptor;

/// Resolve an interpreter the same way the reference tooling does: prefer `python3`,
/// fall back to `python`.
fn resolve_interpreter() -> Result<PathBuf, Error> {
    which::which("python3").or_else(|_| which::which("python")).map_err(Error::from)
}

/// A [`Frontend`] that drives its backend host by spawning a resolved local
/// interpreter. Everything else — dispatch, validation, the metadata fallback — is
/// inherited from [`Frontend`] via [`Deref`].
pub struct SubprocessFrontend(Frontend);

impl SubprocessFrontend {
    pub fn new(project: ProjectDescriptor, interpreter: PathBuf, reuse: bool) -> Result<Self, Error> {
        Ok(Self(Frontend::new(project, interpreter, reuse)?))
    }

    /// Build a Frontend for `root` by reading its `pyproject.toml` (falling back to
    /// legacy setuptools defaults) and resolving an interpreter from `PATH`.
    pub fn for_project(root: &Path, reuse: bool) -> Result<Self, Error> {
        let project = ProjectDescriptor::from_folder(root)?;
        let interpreter = resolve_interpreter()?;
        Self::new(project, interpreter, reuse)
    }

    /// Mirrors the reference tool's `create_args_from_folder`: the project descriptor
    /// tuple a caller would need to construct a Frontend by hand, without resolving an
    /// interpreter or constructing one.
    pub fn create_args_from_folder(root: &Path) -> Result<ProjectDescriptor, Error> {
        ProjectDescriptor::from_folder(root)
    }
}

impl Deref for SubprocessFrontend {
    type Target = Frontend;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_project_falls_back_to_legacy_defaults() {
        let Ok(interpreter) = resolve_interpreter() else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let frontend = SubprocessFrontend::new(
            ProjectDescriptor::from_folder(dir.path()).unwrap(),
            interpreter,
            false,
        )
        .unwrap();
        assert!(frontend.project().is_legacy);
    }
}
