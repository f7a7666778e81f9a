//! Error types.
//!
//! [`Error`] covers local/infrastructure failures (I/O, malformed JSON, a missing
//! interpreter). [`BackendFailure`] is kept separate because it is not a bug in this
//! crate: it is the structured shape every command response failure takes, whether it
//! came from the backend host verbatim or was synthesized locally after a response
//! shape check failed.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed response")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error("invalid pyproject.toml")]
    Toml(#[from] toml_edit::TomlError),
    #[error("could not locate a Python interpreter")]
    InterpreterNotFound(#[from] which::Error),
    #[error("no .dist-info directory found inside generated wheel {0}")]
    MissingDistInfo(PathBuf),
    #[error("backend host failed to start: {err}")]
    BackendStartupFailed { err: String },
    #[error("backend response file {path} is missing")]
    ResponseMissing {
        path: PathBuf,
        out: String,
        err: String,
    },
}

/// A structured failure surfaced from (or on behalf of) the build backend.
///
/// `code` is `Some(1)` when the host caught a raised exception while running a hook
/// (including the case where the hook itself is absent, reported as `MissingCommand`),
/// and `None` when the frontend synthesized the failure locally after the backend's
/// response failed a shape check (a non-string build return, a non-list requirement
/// list, a metadata directory colliding with the project root).
#[derive(Debug, Clone)]
pub struct BackendFailure {
    pub code: Option<i64>,
    pub exc_type: String,
    pub exc_msg: String,
    pub out: String,
    pub err: String,
    pub args: BTreeMap<String, Value>,
}

impl BackendFailure {
    pub fn runtime(message: impl Into<String>, out: String, err: String) -> Self {
        Self {
            code: None,
            exc_type: "RuntimeError".to_string(),
            exc_msg: message.into(),
            out,
            err,
            args: BTreeMap::new(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self {
            code: None,
            exc_type: "TypeError".to_string(),
            exc_msg: message.into(),
            out: String::new(),
            err: String::new(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_args(mut self, args: BTreeMap<String, Value>) -> Self {
        self.args = args;
        self
    }

    /// A multi-line representation including captured stdio and call arguments, distinct
    /// from the one-line [`std::fmt::Display`] summary.
    pub fn debug_repr(&self) -> String {
        format!(
            "BackendFailure {{ code: {:?}, exc_type: {:?}, exc_msg: {:?}, args: {:?} }}\n--- stdout:\n{}\n--- stderr:\n{}\n---",
            self.code, self.exc_type, self.exc_msg, self.args, self.out, self.err
        )
    }
}

impl std::fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.exc_type, self.exc_msg)
    }
}

impl std::error::Error for BackendFailure {}

/// The error type every [`crate::Frontend`] command method returns.
#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Local(#[from] Error),
    #[error(transparent)]
    Backend(#[from] BackendFailure),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_a_one_line_summary_distinct_from_debug_repr() {
        let mut args = BTreeMap::new();
        args.insert("config_settings".to_string(), Value::Null);
        let failure = BackendFailure::type_error("returned 1 but expected type <class 'str'>")
            .with_args(args);

        assert_eq!(
            failure.to_string(),
            "TypeError: returned 1 but expected type <class 'str'>"
        );

        let repr = failure.debug_repr();
        assert!(repr.contains("config_settings"));
        assert!(repr.contains("--- stdout:"));
        assert!(repr.contains("--- stderr:"));
        assert_ne!(repr, failure.to_string());
    }
}
