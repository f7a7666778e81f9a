//! Plain data returned from [`crate::Frontend`] command methods. These own no
//! resources: a `metadata` or `dist` path is the backend's output on disk, not
//! anything this crate manages the lifetime of.

use std::path::PathBuf;

use pep508_rs::Requirement;

/// Filename of a generated artifact (sdist tarball, wheel, editable wheel), and the
/// stdio the backend produced while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactResult {
    pub filename: String,
    pub out: String,
    pub err: String,
}

/// Result of `prepare_metadata_for_build_{wheel,editable}`, or of the
/// metadata-from-wheel fallback. `None` when the backend has no such hook and no
/// fallback was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResult {
    pub metadata: PathBuf,
    pub out: String,
    pub err: String,
}

/// Result of a `get_requires_for_build_*` hook: the declared dependency specifiers,
/// or an empty list when the hook is absent from the backend.
#[derive(Debug, Clone)]
pub struct RequiresResult {
    pub requirements: Vec<Requirement>,
    pub out: String,
    pub err: String,
}

/// Which optional hooks the backend implements, probed once at handshake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionalHooks {
    pub get_requires_for_build_sdist: bool,
    pub get_requires_for_build_wheel: bool,
    pub prepare_metadata_for_build_wheel: bool,
    pub build_editable: bool,
    pub get_requires_for_build_editable: bool,
    pub prepare_metadata_for_build_editable: bool,
}
