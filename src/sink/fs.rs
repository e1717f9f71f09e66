use super::{validate_key, ObjectStore, PutOutcome, SinkError};

use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Stores each object as a file under `root`, with key segments as directories.
///
/// The body is written and synced to a hidden temp file in the target directory, then
/// persisted under its final name without clobbering. A reader never sees a half-written
/// object and an existing object is never replaced. The whole write runs on the blocking
/// pool, so a caller that gives up on the put cannot strand the temp file: it is either
/// persisted or removed when the handle drops.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_new(&self, key: &str, body: Vec<u8>) -> Result<PutOutcome, SinkError> {
        validate_key(key)?;

        let path = self.root.join(key);
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();

        let outcome = tokio::task::spawn_blocking(move || write_new(&parent, &path, &body))
            .await
            .map_err(|e| SinkError::Unavailable(format!("write task for {} failed: {}", key, e)))?;

        outcome.map_err(|source| SinkError::Io {
            key: key.to_string(),
            source,
        })
    }
}

fn write_new(parent: &Path, path: &Path, body: &[u8]) -> std::io::Result<PutOutcome> {
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;

    match tmp.persist_noclobber(path) {
        Ok(_) => {
            tracing::trace!("Wrote {} bytes to {}", body.len(), path.display());
            Ok(PutOutcome::Created)
        }
        // The temp file travels back inside the error and is removed when it drops.
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(PutOutcome::AlreadyExists),
        Err(e) => Err(e.error),
    }
}
