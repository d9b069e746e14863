//! Scene storage on the local filesystem.
//!
//! Asset paths are relative to a root directory. Files ending in `.ron` are
//! human-authored RON documents; everything else uses the binary codec.

use scenebuild_core::document::SceneDocument;
use scenebuild_core::serialize::{decode_document, encode_document};
use scenebuild_core::storage::{SceneStorage, StorageError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of an asset path.
    pub fn locate(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn io_error(path: &str, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: path.to_string(),
            source,
        }
    }
}

fn is_ron(path: &str) -> bool {
    Path::new(path).extension().and_then(|e| e.to_str()) == Some("ron")
}

impl SceneStorage for FsStorage {
    fn read(&self, path: &str) -> Result<SceneDocument, StorageError> {
        let file = self.locate(path);
        let bytes = match std::fs::read(&file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_string()));
            }
            Err(e) => return Err(Self::io_error(path, e)),
        };
        debug!(path, bytes = bytes.len(), "read asset");

        if is_ron(path) {
            let text = String::from_utf8(bytes).map_err(|e| StorageError::Format {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
            ron::from_str(&text).map_err(|e| StorageError::Format {
                path: path.to_string(),
                reason: e.to_string(),
            })
        } else {
            decode_document(&bytes).map_err(|source| StorageError::Decode {
                path: path.to_string(),
                source,
            })
        }
    }

    fn write(&mut self, path: &str, doc: &SceneDocument) -> Result<(), StorageError> {
        let bytes = if is_ron(path) {
            ron::ser::to_string_pretty(doc, ron::ser::PrettyConfig::default())
                .map_err(|e| StorageError::Format {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?
                .into_bytes()
        } else {
            encode_document(doc).map_err(|source| StorageError::Encode {
                path: path.to_string(),
                source,
            })?
        };

        let file = self.locate(path);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Self::io_error(path, e))?;
        }
        std::fs::write(&file, &bytes).map_err(|e| Self::io_error(path, e))?;
        debug!(path, bytes = bytes.len(), "wrote asset");
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.locate(path).is_file()
    }

    fn delete(&mut self, path: &str) -> Result<bool, StorageError> {
        match std::fs::remove_file(self.locate(path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(path, e)),
        }
    }
}
