//! Generic async file-based config source.
//!
//! [`FileSource`] implements [`ConfigSource`] for any file format by
//! accepting a deserialization function at construction time. It reads
//! the file asynchronously via Tokio. Validation happens after CLI
//! overrides are merged, so a file may omit fields the command line
//! supplies.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::model::Config;
use crate::config::ConfigSource;
use crate::error::RelaycastError;

type Deserialize = fn(&str) -> Result<Config, Box<dyn std::error::Error + Send + Sync>>;

pub struct FileSource {
    path: PathBuf,
    name: &'static str,
    deserialize: Deserialize,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf, name: &'static str, deserialize: Deserialize) -> Self {
        Self {
            path,
            name,
            deserialize,
        }
    }

    #[cfg(feature = "yaml")]
    #[must_use]
    pub fn yaml(path: PathBuf) -> Self {
        Self::new(path, "yaml", |content| {
            serde_yml::from_str::<Config>(content).map_err(Into::into)
        })
    }

    #[cfg(feature = "json")]
    #[must_use]
    pub fn json(path: PathBuf) -> Self {
        Self::new(path, "json", |content| {
            serde_json::from_str::<Config>(content).map_err(Into::into)
        })
    }

    #[cfg(feature = "toml")]
    #[must_use]
    pub fn toml(path: PathBuf) -> Self {
        Self::new(path, "toml", |content| {
            toml::from_str::<Config>(content).map_err(Into::into)
        })
    }

    /// Pick the format from the file extension.
    pub fn for_path(path: &Path) -> Result<Self, RelaycastError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Ok(Self::yaml(path.to_path_buf())),

            #[cfg(feature = "json")]
            "json" => Ok(Self::json(path.to_path_buf())),

            #[cfg(feature = "toml")]
            "toml" => Ok(Self::toml(path.to_path_buf())),

            other => Err(RelaycastError::UnsupportedFormat(other.to_string())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_content(&self) -> Result<String, RelaycastError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelaycastError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                RelaycastError::Io(e)
            }
        })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self) -> Result<Config, RelaycastError> {
        let content = self.read_content().await?;

        (self.deserialize)(&content).map_err(|e| RelaycastError::ConfigParse {
            path: self.path.display().to_string(),
            source: e,
        })
    }
}
