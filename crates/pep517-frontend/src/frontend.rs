//! Command dispatch, response validation, and the metadata-from-wheel fallback.
//!
//! [`Frontend`] is deliberately bound to one locally spawnable interpreter rather than
//! modeling interpreter resolution as a separate abstraction: the backend host is
//! always the embedded Python script, so there is only ever one way to start it.
//! [`crate::subprocess_frontend::SubprocessFrontend`] adds the convenience constructor
//! that resolves an interpreter from `PATH` and reads a project's `pyproject.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pep508_rs::Requirement;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::{BackendFailure, Error, FrontendError};
use crate::metadata_extractor;
use crate::project::{ensure_empty_dir, ProjectDescriptor};
use crate::results::{ArtifactResult, MetadataResult, OptionalHooks, RequiresResult};
use crate::supervisor::ProcessSupervisor;
use crate::wire::Response;

/// The label every prepare-metadata TypeError message carries, including for the
/// editable variant. Asserted by the source's own test suite; not "corrected".
const PREPARE_METADATA_LABEL: &str = "prepare_metadata_for_build_wheel";

pub struct Frontend {
    project: ProjectDescriptor,
    interpreter: PathBuf,
    reuse: bool,
    scratch: PathBuf,
    supervisor: Mutex<Option<ProcessSupervisor>>,
    optional_hooks: Mutex<Option<OptionalHooks>>,
}

impl Frontend {
    pub fn new(project: ProjectDescriptor, interpreter: PathBuf, reuse: bool) -> Result<Self, Error> {
        let scratch = tempfile::Builder::new()
            .prefix("pep517-frontend-")
            .tempdir()?
            .into_path();
        Ok(Self {
            project,
            interpreter,
            reuse,
            scratch,
            supervisor: Mutex::new(None),
            optional_hooks: Mutex::new(None),
        })
    }

    pub fn project(&self) -> &ProjectDescriptor {
        &self.project
    }

    /// Close the backend host if one is running. Safe to call more than once; the
    /// child is also force-killed on drop if this is never called.
    pub async fn close(&self) -> Result<(), Error> {
        if let Some(supervisor) = self.supervisor.lock().await.as_mut() {
            supervisor.shutdown().await?;
        }
        *self.supervisor.lock().await = None;
        Ok(())
    }

    async fn dispatch(
        &self,
        cmd: &str,
        kwargs: BTreeMap<String, Value>,
    ) -> Result<(Value, String, String), FrontendError> {
        let mut guard = self.supervisor.lock().await;
        if guard.is_none() {
            match ProcessSupervisor::spawn(
                &self.interpreter,
                &self.project.backend_paths,
                &self.project.backend_spec(),
                self.reuse,
                self.scratch.clone(),
            )
            .await
            {
                Ok(supervisor) => *guard = Some(supervisor),
                Err(Error::BackendStartupFailed { err }) => {
                    return Err(BackendFailure {
                        code: Some(1),
                        exc_type: "RuntimeError".to_string(),
                        exc_msg: "failed to start backend".to_string(),
                        out: String::new(),
                        err,
                        args: kwargs,
                    }
                    .into());
                }
                Err(other) => return Err(other.into()),
            }
        }
        let supervisor = guard.as_mut().expect("just populated");

        let (response, out, err) = match supervisor.send(cmd, kwargs.clone()).await {
            Ok(ok) => ok,
            Err(Error::ResponseMissing { path, out, err }) => {
                return Err(BackendFailure::runtime(
                    format!("Backend response file {} is missing", path.display()),
                    out,
                    err,
                )
                .with_args(kwargs)
                .into());
            }
            Err(other) => return Err(other.into()),
        };

        if !self.reuse {
            supervisor.shutdown().await.map_err(Error::from)?;
            *guard = None;
        }

        match response {
            Response::Return(value) => Ok((value, out, err)),
            Response::Failure {
                code,
                exc_type,
                exc_msg,
            } => Err(BackendFailure {
                code,
                exc_type,
                exc_msg,
                out,
                err,
                args: kwargs,
            }
            .into()),
        }
    }

    /// Probe the backend once for which optional hooks it implements, caching the
    /// result for the lifetime of this Frontend.
    #[instrument(skip(self))]
    pub async fn optional_hooks(&self) -> Result<OptionalHooks, FrontendError> {
        if let Some(hooks) = *self.optional_hooks.lock().await {
            return Ok(hooks);
        }
        let (value, _out, _err) = self.dispatch("_optional_hooks", BTreeMap::new()).await?;
        let hooks = OptionalHooks {
            get_requires_for_build_sdist: bool_field(&value, "get_requires_for_build_sdist"),
            get_requires_for_build_wheel: bool_field(&value, "get_requires_for_build_wheel"),
            prepare_metadata_for_build_wheel: bool_field(&value, "prepare_metadata_for_build_wheel"),
            build_editable: bool_field(&value, "build_editable"),
            get_requires_for_build_editable: bool_field(&value, "get_requires_for_build_editable"),
            prepare_metadata_for_build_editable: bool_field(&value, "prepare_metadata_for_build_editable"),
        };
        *self.optional_hooks.lock().await = Some(hooks);
        Ok(hooks)
    }

    #[instrument(skip(self, config_settings))]
    pub async fn build_sdist(
        &self,
        sdist_directory: &Path,
        config_settings: Option<Value>,
    ) -> Result<ArtifactResult, FrontendError> {
        ensure_empty_dir(sdist_directory).map_err(FrontendError::from)?;
        let mut kwargs = BTreeMap::new();
        kwargs.insert("sdist_directory".to_string(), path_value(sdist_directory));
        kwargs.insert("config_settings".to_string(), config_settings.unwrap_or(Value::Null));
        let (value, out, err) = self.dispatch("build_sdist", kwargs.clone()).await?;
        let filename = expect_str("build_sdist", &self.project.backend_module, &value, kwargs, &out, &err)?;
        Ok(ArtifactResult { filename, out, err })
    }

    #[instrument(skip(self, config_settings))]
    pub async fn build_wheel(
        &self,
        wheel_directory: &Path,
        config_settings: Option<Value>,
        metadata_directory: Option<&Path>,
    ) -> Result<ArtifactResult, FrontendError> {
        ensure_empty_dir(wheel_directory).map_err(FrontendError::from)?;
        let mut kwargs = BTreeMap::new();
        kwargs.insert("wheel_directory".to_string(), path_value(wheel_directory));
        kwargs.insert("config_settings".to_string(), config_settings.unwrap_or(Value::Null));
        kwargs.insert(
            "metadata_directory".to_string(),
            metadata_directory.map_or(Value::Null, path_value),
        );
        let (value, out, err) = self.dispatch("build_wheel", kwargs.clone()).await?;
        let filename = expect_str("build_wheel", &self.project.backend_module, &value, kwargs, &out, &err)?;
        Ok(ArtifactResult { filename, out, err })
    }

    #[instrument(skip(self, config_settings))]
    pub async fn build_editable(
        &self,
        wheel_directory: &Path,
        config_settings: Option<Value>,
        metadata_directory: Option<&Path>,
    ) -> Result<ArtifactResult, FrontendError> {
        ensure_empty_dir(wheel_directory).map_err(FrontendError::from)?;
        let mut kwargs = BTreeMap::new();
        kwargs.insert("wheel_directory".to_string(), path_value(wheel_directory));
        kwargs.insert("config_settings".to_string(), config_settings.unwrap_or(Value::Null));
        kwargs.insert(
            "metadata_directory".to_string(),
            metadata_directory.map_or(Value::Null, path_value),
        );
        let (value, out, err) = self.dispatch("build_editable", kwargs.clone()).await?;
        let filename = expect_str("build_editable", &self.project.backend_module, &value, kwargs, &out, &err)?;
        Ok(ArtifactResult { filename, out, err })
    }

    #[instrument(skip(self, config_settings))]
    pub async fn get_requires_for_build_sdist(
        &self,
        config_settings: Option<Value>,
    ) -> Result<RequiresResult, FrontendError> {
        let hooks = self.optional_hooks().await?;
        self.get_requires(
            "get_requires_for_build_sdist",
            config_settings,
            hooks.get_requires_for_build_sdist,
        )
        .await
    }

    #[instrument(skip(self, config_settings))]
    pub async fn get_requires_for_build_wheel(
        &self,
        config_settings: Option<Value>,
    ) -> Result<RequiresResult, FrontendError> {
        let hooks = self.optional_hooks().await?;
        self.get_requires(
            "get_requires_for_build_wheel",
            config_settings,
            hooks.get_requires_for_build_wheel,
        )
        .await
    }

    #[instrument(skip(self, config_settings))]
    pub async fn get_requires_for_build_editable(
        &self,
        config_settings: Option<Value>,
    ) -> Result<RequiresResult, FrontendError> {
        let hooks = self.optional_hooks().await?;
        self.get_requires(
            "get_requires_for_build_editable",
            config_settings,
            hooks.get_requires_for_build_editable,
        )
        .await
    }

    async fn get_requires(
        &self,
        cmd: &str,
        config_settings: Option<Value>,
        present: bool,
    ) -> Result<RequiresResult, FrontendError> {
        if !present {
            return Ok(RequiresResult {
                requirements: Vec::new(),
                out: String::new(),
                err: String::new(),
            });
        }
        let mut kwargs = BTreeMap::new();
        kwargs.insert("config_settings".to_string(), config_settings.unwrap_or(Value::Null));
        let (value, out, err) = self.dispatch(cmd, kwargs.clone()).await?;
        let Some(items) = value.as_array() else {
            return Err(BackendFailure::type_error(format!(
                "'{cmd}' on '{}' returned {value} but expected type 'list of string'",
                self.project.backend_module
            ))
            .with_args(kwargs)
            .into());
        };
        let mut requirements = Vec::new();
        for item in items {
            let Some(spec) = item.as_str() else {
                return Err(BackendFailure::type_error(format!(
                    "'{cmd}' on '{}' returned {value} but expected type 'list of string'",
                    self.project.backend_module
                ))
                .with_args(kwargs)
                .into());
            };
            let Ok(requirement) = spec.parse::<Requirement>() else {
                return Err(BackendFailure::type_error(format!(
                    "'{cmd}' on '{}' returned {value} but expected type 'list of string'",
                    self.project.backend_module
                ))
                .with_args(kwargs)
                .into());
            };
            requirements.push(requirement);
        }
        Ok(RequiresResult { requirements, out, err })
    }

    #[instrument(skip(self, config_settings))]
    pub async fn prepare_metadata_for_build_wheel(
        &self,
        metadata_directory: &Path,
        config_settings: Option<Value>,
    ) -> Result<Option<MetadataResult>, FrontendError> {
        check_metadata_directory(&self.project, metadata_directory)?;
        let hooks = self.optional_hooks().await?;
        if !hooks.prepare_metadata_for_build_wheel {
            return Ok(None);
        }
        self.prepare_metadata(
            "prepare_metadata_for_build_wheel",
            metadata_directory,
            config_settings,
        )
        .await
    }

    #[instrument(skip(self, config_settings))]
    pub async fn prepare_metadata_for_build_editable(
        &self,
        metadata_directory: &Path,
        config_settings: Option<Value>,
    ) -> Result<Option<MetadataResult>, FrontendError> {
        check_metadata_directory(&self.project, metadata_directory)?;
        let hooks = self.optional_hooks().await?;
        if !hooks.prepare_metadata_for_build_editable {
            return Ok(None);
        }
        self.prepare_metadata(
            "prepare_metadata_for_build_editable",
            metadata_directory,
            config_settings,
        )
        .await
    }

    async fn prepare_metadata(
        &self,
        cmd: &str,
        metadata_directory: &Path,
        config_settings: Option<Value>,
    ) -> Result<Option<MetadataResult>, FrontendError> {
        check_metadata_directory(&self.project, metadata_directory)?;
        ensure_empty_dir(metadata_directory).map_err(FrontendError::from)?;

        let mut kwargs = BTreeMap::new();
        kwargs.insert("metadata_directory".to_string(), path_value(metadata_directory));
        kwargs.insert("config_settings".to_string(), config_settings.unwrap_or(Value::Null));
        let (value, out, err) = self.dispatch(cmd, kwargs.clone()).await?;
        let dirname = expect_str(PREPARE_METADATA_LABEL, &self.project.backend_module, &value, kwargs, &out, &err)?;
        Ok(Some(MetadataResult {
            metadata: metadata_directory.join(dirname),
            out,
            err,
        }))
    }

    /// The artifact-to-metadata fallback: build a throwaway wheel or editable wheel in
    /// `directory` and extract its `.dist-info/` tree there.
    #[instrument(skip(self))]
    pub async fn metadata_from_built(
        &self,
        directory: &Path,
        target: &str,
    ) -> Result<MetadataResult, FrontendError> {
        ensure_empty_dir(directory).map_err(FrontendError::from)?;

        let artifact = if target == "editable" {
            self.build_editable(directory, None, None).await?
        } else {
            self.build_wheel(directory, None, None).await?
        };

        let wheel_path = directory.join(&artifact.filename);
        if !wheel_path.is_file() {
            return Err(BackendFailure::runtime(
                format!("missing wheel file return by backed {}", wheel_path.display()),
                artifact.out,
                artifact.err,
            )
            .into());
        }

        let dist_info = metadata_extractor::extract_dist_info(&wheel_path, directory)
            .map_err(FrontendError::from)?;

        Ok(MetadataResult {
            metadata: dist_info,
            out: artifact.out,
            err: artifact.err,
        })
    }
}

impl Drop for Frontend {
    fn drop(&mut self) {
        let _ = fs_err::remove_dir_all(&self.scratch);
    }
}

/// `metadata_directory` must not equal the project root. Checked before the backend
/// host is even contacted, so a colliding-root call never pays for a handshake.
fn check_metadata_directory(project: &ProjectDescriptor, metadata_directory: &Path) -> Result<(), FrontendError> {
    if metadata_directory == project.root {
        return Err(BackendFailure::runtime(
            format!(
                "the project root and the metadata directory can't be the same {}",
                project.root.display()
            ),
            String::new(),
            String::new(),
        )
        .into());
    }
    Ok(())
}

fn bool_field(value: &Value, name: &str) -> bool {
    value.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

fn expect_str(
    cmd: &str,
    backend: &str,
    value: &Value,
    args: BTreeMap<String, Value>,
    out: &str,
    err: &str,
) -> Result<String, FrontendError> {
    match value.as_str() {
        Some(s) => Ok(s.to_string()),
        None => {
            let mut failure = BackendFailure::type_error(format!(
                "'{cmd}' on '{backend}' returned {value} but expected type <class 'str'>"
            ))
            .with_args(args);
            failure.out = out.to_string();
            failure.err = err.to_string();
            Err(failure.into())
        }
    }
}
