use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use url::Url;

use crate::{error::DtsError, store::DocumentSource, uri::normalize_document_uri};

/// Reads `file:` URIs from disk. Remote URIs are served from an optional mirror directory laid
/// out as `<mirror>/<host>/<path>`.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    mirror: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> FileSource {
        FileSource::default()
    }

    pub fn with_mirror(mirror: impl AsRef<Path>) -> FileSource {
        FileSource {
            mirror: Some(mirror.as_ref().to_path_buf()),
        }
    }

    /// Local path holding the content of `uri`, if there is one.
    pub fn local_path(&self, uri: &Url) -> Result<PathBuf, DtsError> {
        if uri.scheme() == "file" {
            return uri
                .to_file_path()
                .map_err(|_| DtsError::InvalidUri(format!("{uri} is not a local file path")));
        }
        let Some(mirror) = self.mirror.as_ref() else {
            return Err(DtsError::NotFound(format!(
                "{uri} is remote and no mirror directory is configured"
            )));
        };
        let host = uri
            .host_str()
            .ok_or_else(|| DtsError::InvalidUri(format!("{uri} has no host")))?;
        let mut path = mirror.join(host);
        for segment in uri.path_segments().into_iter().flatten() {
            if !segment.is_empty() && segment != ".." {
                path.push(segment);
            }
        }
        Ok(path)
    }
}

impl DocumentSource for FileSource {
    async fn fetch(&self, uri: &Url) -> Result<String, DtsError> {
        let path = self.local_path(uri)?;
        tracing::debug!("[FileSource] reading {} from {:?}", uri, path);
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

/// Serves documents from memory and counts how often each one was fetched.
#[derive(Debug, Default)]
pub struct MemorySource {
    documents: RwLock<BTreeMap<Url, String>>,
    fetches: RwLock<BTreeMap<Url, usize>>,
}

impl MemorySource {
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    /// Add or replace a document. The URI is normalized.
    pub fn insert(&self, uri: &Url, content: impl Into<String>) -> Result<(), DtsError> {
        let uri = normalize_document_uri(uri)?;
        self.documents.write().insert(uri, content.into());
        Ok(())
    }

    pub fn with_document(self, uri: &str, content: impl Into<String>) -> Result<Self, DtsError> {
        self.insert(&Url::parse(uri)?, content)?;
        Ok(self)
    }

    pub fn fetch_count(&self, uri: &Url) -> usize {
        self.fetches.read().get(uri).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.read().values().sum()
    }
}

impl DocumentSource for MemorySource {
    async fn fetch(&self, uri: &Url) -> Result<String, DtsError> {
        *self.fetches.write().entry(uri.clone()).or_insert(0) += 1;
        self.documents
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| DtsError::NotFound(format!("{uri} is not available")))
    }
}
