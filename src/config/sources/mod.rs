//! Concrete [`ConfigSource`](super::ConfigSource) implementations.
//!
//! [`FileSource`](file_source::FileSource) reads YAML, JSON or TOML, each
//! format gated by a feature flag, and [`resolve_file_source`] finds the
//! file to read.

pub mod file_source;

use std::path::{Path, PathBuf};

use crate::error::RelaycastError;
use file_source::FileSource;

/// File names probed in the working directory when no `--config` is given.
pub const AUTO_DETECT_CANDIDATES: [&str; 4] = [
    "relaycast.yaml",
    "relaycast.yml",
    "relaycast.json",
    "relaycast.toml",
];

/// Use `explicit` when given, otherwise the first candidate present in `dir`.
pub async fn resolve_file_source(
    explicit: Option<&Path>,
    dir: &Path,
) -> Result<Option<FileSource>, RelaycastError> {
    if let Some(path) = explicit {
        return FileSource::for_path(path).map(Some);
    }

    for name in &AUTO_DETECT_CANDIDATES {
        let path: PathBuf = dir.join(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return FileSource::for_path(&path).map(Some);
        }
    }

    Ok(None)
}
