//! Scene asset storage.
//!
//! The pipeline only ever talks to a [`SceneStorage`]: read a document by
//! path, write one, check for and delete an asset. [`MemoryStorage`] keeps
//! encoded documents in a map; the filesystem store lives in the data crate.

use crate::document::SceneDocument;
use crate::serialize::{DeserializeError, SerializeError, decode_document, encode_document};
use std::collections::BTreeMap;

/// Errors that can occur while reading or writing scene assets.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("failed to encode '{path}': {source}")]
    Encode {
        path: String,
        #[source]
        source: SerializeError,
    },
    #[error("failed to decode '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: DeserializeError,
    },
    #[error("failed to parse '{path}': {reason}")]
    Format { path: String, reason: String },
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("storage rejected '{path}': {reason}")]
    Rejected { path: String, reason: String },
}

/// Asset store for scene documents, addressed by path.
pub trait SceneStorage: std::fmt::Debug {
    /// Load the document stored at `path`.
    fn read(&self, path: &str) -> Result<SceneDocument, StorageError>;

    /// Store `doc` at `path`, replacing any existing asset.
    fn write(&mut self, path: &str, doc: &SceneDocument) -> Result<(), StorageError>;

    fn exists(&self, path: &str) -> bool;

    /// Delete the asset at `path`. Returns `false` if there was none.
    fn delete(&mut self, path: &str) -> Result<bool, StorageError>;

    /// Resolve an opaque asset reference to a loadable path.
    fn resolve(&self, reference: &str) -> Option<String> {
        self.exists(reference).then(|| reference.to_string())
    }
}

/// In-memory store holding encoded documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    assets: BTreeMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an asset. Same as [`SceneStorage::write`].
    pub fn insert(&mut self, path: &str, doc: &SceneDocument) -> Result<(), StorageError> {
        self.write(path, doc)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl SceneStorage for MemoryStorage {
    fn read(&self, path: &str) -> Result<SceneDocument, StorageError> {
        let bytes = self
            .assets
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        decode_document(bytes).map_err(|source| StorageError::Decode {
            path: path.to_string(),
            source,
        })
    }

    fn write(&mut self, path: &str, doc: &SceneDocument) -> Result<(), StorageError> {
        let bytes = encode_document(doc).map_err(|source| StorageError::Encode {
            path: path.to_string(),
            source,
        })?;
        self.assets.insert(path.to_string(), bytes);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.assets.contains_key(path)
    }

    fn delete(&mut self, path: &str) -> Result<bool, StorageError> {
        Ok(self.assets.remove(path).is_some())
    }
}
