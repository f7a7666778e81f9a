//! Project discovery: reading `pyproject.toml` into a [`ProjectDescriptor`], and the
//! "recreate empty" directory invariant every build/metadata call relies on.

use std::path::{Path, PathBuf};

use pep508_rs::Requirement;

use crate::error::Error;

const LEGACY_BACKEND_MODULE: &str = "setuptools.build_meta";
const LEGACY_BACKEND_OBJECT: &str = "__legacy__";
const LEGACY_REQUIRES: [&str; 2] = ["setuptools>=40.8.0", "wheel"];

/// Everything the frontend needs to know about a project to drive its backend.
#[derive(Debug, Clone)]
pub struct ProjectDescriptor {
    pub root: PathBuf,
    pub backend_paths: Vec<PathBuf>,
    pub backend_module: String,
    pub backend_object: Option<String>,
    pub requires: Vec<Requirement>,
    pub is_legacy: bool,
}

impl ProjectDescriptor {
    /// Read `root/pyproject.toml`, falling back to the legacy `setuptools.build_meta`
    /// defaults when the file is missing, has no `[build-system]` table, or the table
    /// has no `build-backend` key.
    pub fn from_folder(root: &Path) -> Result<Self, Error> {
        let Ok(contents) = fs_err::read_to_string(root.join("pyproject.toml")) else {
            return Ok(Self::legacy(root));
        };
        let document = contents.parse::<toml_edit::DocumentMut>()?;
        let Some(build_system) = document.get("build-system").and_then(|v| v.as_table_like())
        else {
            return Ok(Self::legacy(root));
        };
        let Some(backend_spec) = build_system.get("build-backend").and_then(|v| v.as_str())
        else {
            return Ok(Self::legacy(root));
        };

        let (backend_module, backend_object) = split_backend_spec(backend_spec);

        let backend_paths = build_system
            .get("backend-path")
            .and_then(|v| v.as_array())
            .map(|array| {
                array
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|p| root.join(p))
                    .collect()
            })
            .unwrap_or_default();

        let requires = build_system
            .get("requires")
            .and_then(|v| v.as_array())
            .map(|array| {
                array
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| s.parse::<Requirement>().ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            root: root.to_path_buf(),
            backend_paths,
            backend_module,
            backend_object,
            requires,
            is_legacy: false,
        })
    }

    fn legacy(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            backend_paths: Vec::new(),
            backend_module: LEGACY_BACKEND_MODULE.to_string(),
            backend_object: Some(LEGACY_BACKEND_OBJECT.to_string()),
            requires: LEGACY_REQUIRES
                .iter()
                .map(|r| r.parse().expect("static requirement string parses"))
                .collect(),
            is_legacy: true,
        }
    }

    /// The `module:object` (or bare `module`) spec passed as the backend host's argv.
    pub fn backend_spec(&self) -> String {
        match &self.backend_object {
            Some(object) if !object.is_empty() => format!("{}:{object}", self.backend_module),
            _ => self.backend_module.clone(),
        }
    }
}

/// Split a `build-backend` string into `(module, object)`, tolerating a trailing `:`
/// (`module:object:` is treated the same as `module:object`).
fn split_backend_spec(spec: &str) -> (String, Option<String>) {
    let spec = spec.strip_suffix(':').unwrap_or(spec);
    match spec.split_once(':') {
        Some((module, object)) => (module.to_string(), Some(object.to_string())),
        None => (spec.to_string(), None),
    }
}

/// Recursively remove `path` (file or directory) and recreate it as an empty directory.
///
/// Called before every build/metadata hook dispatch: the directory's mtime changing on
/// every call is what makes metadata regeneration observable, and it keeps a stale
/// artifact from a prior call from contaminating the next one.
pub fn ensure_empty_dir(path: &Path) -> Result<(), Error> {
    if path.is_dir() {
        fs_err::remove_dir_all(path)?;
    } else if path.is_file() {
        fs_err::remove_file(path)?;
    }
    fs_err::create_dir_all(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pyproject_toml_yields_legacy_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = ProjectDescriptor::from_folder(dir.path()).unwrap();
        assert!(descriptor.is_legacy);
        assert_eq!(descriptor.backend_module, "setuptools.build_meta");
        assert_eq!(descriptor.backend_object.as_deref(), Some("__legacy__"));
        assert_eq!(descriptor.backend_paths, Vec::<PathBuf>::new());
        assert_eq!(
            descriptor
                .requires
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["setuptools>=40.8.0".to_string(), "wheel".to_string()]
        );
    }

    #[test]
    fn empty_build_system_table_yields_legacy_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("pyproject.toml"), "[build-system]\n").unwrap();
        let descriptor = ProjectDescriptor::from_folder(dir.path()).unwrap();
        assert!(descriptor.is_legacy);
        assert_eq!(descriptor.backend_module, "setuptools.build_meta");
    }

    #[test]
    fn explicit_backend_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(
            dir.path().join("pyproject.toml"),
            "[build-system]\nrequires = [\"flit_core\"]\nbuild-backend = \"flit_core.buildapi\"\n",
        )
        .unwrap();
        let descriptor = ProjectDescriptor::from_folder(dir.path()).unwrap();
        assert!(!descriptor.is_legacy);
        assert_eq!(descriptor.backend_module, "flit_core.buildapi");
        assert_eq!(descriptor.backend_object, None);
        assert_eq!(descriptor.backend_spec(), "flit_core.buildapi");
    }

    #[test]
    fn trailing_colon_on_backend_object_is_stripped() {
        let (module, object) = split_backend_spec("build.api:backend:");
        assert_eq!(module, "build.api");
        assert_eq!(object.as_deref(), Some("backend"));
    }

    #[test]
    fn ensure_empty_dir_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a");
        fs_err::write(&target, b"").unwrap();
        ensure_empty_dir(&target).unwrap();
        assert!(target.is_dir());
        assert!(fs_err::read_dir(&target).unwrap().next().is_none());
    }

    #[test]
    fn ensure_empty_dir_wipes_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a");
        fs_err::create_dir(&target).unwrap();
        fs_err::write(target.join("stale"), b"x").unwrap();
        ensure_empty_dir(&target).unwrap();
        assert!(fs_err::read_dir(&target).unwrap().next().is_none());
    }
}
