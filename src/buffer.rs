//! On-disk request buffer.
//!
//! The inbound body is streamed once into a scratch file named after the
//! request id. Every delivery then opens its own independent read handle,
//! so targets replay the body concurrently without sharing a cursor. The
//! file is removed only after the last reader is gone.

use std::path::{Path, PathBuf};

use axum::body::Body;
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::BufferError;

const FILE_PREFIX: &str = "relaycast-";

#[derive(Debug, Clone)]
pub struct RequestBuffer {
    dir: PathBuf,
}

/// A fully written buffer file.
#[derive(Debug)]
pub struct BufferHandle {
    path: PathBuf,
    len: u64,
}

impl RequestBuffer {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, request_id: &str) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{request_id}"))
    }

    /// Persist `body` under `request_id`. A partial file is removed on failure.
    pub async fn store(&self, request_id: &str, body: Body) -> Result<BufferHandle, BufferError> {
        let path = self.path_for(request_id);
        let file = File::create(&path)
            .await
            .map_err(|source| BufferError::Create {
                path: path.clone(),
                source,
            })?;

        match write_body(file, &path, body).await {
            Ok(len) => Ok(BufferHandle { path, len }),
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(
                        path = %path.display(),
                        error = %remove_err,
                        "failed to remove partial buffer file"
                    );
                }
                Err(e)
            }
        }
    }

    /// Delete the buffer file. Callers must ensure every reader is closed.
    pub async fn release(&self, handle: &BufferHandle) -> Result<(), BufferError> {
        tokio::fs::remove_file(&handle.path)
            .await
            .map_err(|source| BufferError::Release {
                path: handle.path.clone(),
                source,
            })
    }
}

async fn write_body(mut file: File, path: &Path, body: Body) -> Result<u64, BufferError> {
    let write_err = |source| BufferError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut len = 0u64;
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BufferError::Receive)?;
        file.write_all(&chunk).await.map_err(write_err)?;
        len += chunk.len() as u64;
    }
    // tokio buffers writes in the background; flush before readers open it
    file.flush().await.map_err(write_err)?;
    Ok(len)
}

impl BufferHandle {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Open a fresh reader positioned at the start of the body.
    pub async fn open(&self) -> Result<File, BufferError> {
        File::open(&self.path)
            .await
            .map_err(|source| BufferError::Open {
                path: self.path.clone(),
                source,
            })
    }
}
