use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object key '{0}' is not a valid relative path")]
    InvalidKey(String),
    #[error("upload of '{key}' failed: {message}")]
    Upload { key: String, message: String },
}

pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key` and returns a URL where it can be fetched.
    fn put(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<String, StorageError>;
}

#[must_use]
pub fn public_url(base: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

/// Writes objects below a local directory. Used by the CLI and as a
/// self-hosted store when no bucket is configured.
#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: PathBuf,
    public_base: Option<String>,
}

impl DirectoryObjectStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base: None,
        }
    }

    #[must_use]
    pub fn with_public_base(mut self, base: impl Into<String>) -> Self {
        self.public_base = Some(base.into());
        self
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let is_plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if key.is_empty() || !is_plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for DirectoryObjectStore {
    #[instrument(skip(self, bytes), fields(root = %self.root.display(), size = bytes.len()))]
    fn put(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<String, StorageError> {
        let path = self.resolve(key)?;
        let failure = |error: std::io::Error| StorageError::Upload {
            key: key.to_string(),
            message: error.to_string(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(failure)?;
        }
        let mut staged = tempfile::NamedTempFile::new_in(path.parent().unwrap_or(&self.root))
            .map_err(failure)?;
        std::io::Write::write_all(&mut staged, &bytes).map_err(failure)?;
        staged
            .persist(&path)
            .map_err(|error| failure(error.error))?;

        let url = match &self.public_base {
            Some(base) => public_url(base, key),
            None => path.display().to_string(),
        };
        info!(%url, content_type, "object stored");
        Ok(url)
    }
}
