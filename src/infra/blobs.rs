//! Filesystem-backed blob store.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{pin_mut, StreamExt};
use tokio::{fs, io::AsyncWriteExt};

use crate::application::stores::{BlobError, BlobStore};
use crate::domain::artifact::{ArtifactPayload, ContentType, PayloadStreamError};

/// Blob store rooted at a local directory. Blobs live at
/// `{root}/{owner_id}/{filename}`; the resolved locator is the absolute
/// filesystem path.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Initialise storage rooted at the provided directory, creating it if
    /// necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve a stored path against the root, rejecting anything that would
    /// escape it or resolve to the root itself. Every accepted path is a
    /// strict descendant of `root` made of plain name components, so a
    /// degenerate owner id (empty, `.`, `..`) can never address another
    /// owner's namespace.
    fn absolute(&self, stored_path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(stored_path);
        let mut components = relative.components().peekable();
        if components.peek().is_none() {
            return Err(BlobError::InvalidPath);
        }
        if !components.all(|component| matches!(component, Component::Normal(_))) {
            return Err(BlobError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }

    /// Stream the payload to disk, removing the partial file when the stream
    /// fails mid-write. Partially written media with no record is wasted
    /// storage; a record pointing at a partial file would be an integrity
    /// breach.
    async fn write_stream<S>(&self, absolute: &Path, stream: S) -> Result<(), BlobError>
    where
        S: futures::Stream<Item = Result<Bytes, PayloadStreamError>>,
    {
        let mut file = fs::File::create(absolute).await?;
        let mut saw_payload = false;

        pin_mut!(stream);
        while let Some(chunk_result) = stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(source) => {
                    drop(file);
                    let _ = fs::remove_file(absolute).await;
                    return Err(BlobError::PayloadStream { source });
                }
            };

            if chunk.is_empty() {
                continue;
            }

            saw_payload = true;
            file.write_all(&chunk).await?;
        }

        file.flush().await?;

        if !saw_payload {
            drop(file);
            let _ = fs::remove_file(absolute).await;
            return Err(BlobError::EmptyPayload);
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        owner_id: &str,
        payload: ArtifactPayload,
        filename: &str,
        _content_type: ContentType,
    ) -> Result<String, BlobError> {
        let stored_path = format!("{owner_id}/{filename}");
        let absolute = self.absolute(&stored_path)?;

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        match payload {
            ArtifactPayload::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(BlobError::EmptyPayload);
                }
                let stream =
                    futures::stream::once(async move { Ok::<_, PayloadStreamError>(bytes) });
                self.write_stream(&absolute, stream).await?;
            }
            ArtifactPayload::Stream(stream) => {
                self.write_stream(&absolute, stream).await?;
            }
        }

        Ok(stored_path)
    }

    async fn resolve(&self, path: &str) -> Result<Option<String>, BlobError> {
        let absolute = self.absolute(path)?;
        match fs::metadata(&absolute).await {
            Ok(_) => Ok(Some(absolute.to_string_lossy().into_owned())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let absolute = self.absolute(path)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<(), BlobError> {
        let directory = self.absolute(owner_id)?;
        match fs::remove_dir_all(&directory).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BlobError::Io(err)),
        }
    }
}
