//! Storage ports: traits describing the blob and metadata adapters.
//!
//! The two stores have no awareness of each other; the cache orchestrator is
//! the only component allowed to coordinate them.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::artifact::{ArtifactPayload, ContentType, PayloadStreamError};
use crate::domain::record::{CacheKey, CacheRecord};

/// Errors surfaced by a blob store backend.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("blob payload stream failed")]
    PayloadStream {
        #[source]
        source: PayloadStreamError,
    },
    #[error("blob payload is empty")]
    EmptyPayload,
    #[error("blob backend unavailable: {message}")]
    Unavailable { message: String },
}

impl BlobError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Errors surfaced by a metadata store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate record violates unique constraint on `{key}`")]
    Duplicate { key: CacheKey },
    #[error("metadata backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Byte payload store keyed by `{owner_id}/{filename}` paths.
///
/// The two-level namespace is a wire contract: owner-scoped bulk deletion
/// depends on every blob living under its owner's folder, and any alternate
/// backend must preserve it.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `payload` under `{owner_id}/{filename}`, overwriting any
    /// existing blob, and return the backend path used for later retrieval
    /// and deletion. The call suspends until every byte is durably written
    /// or the backend acknowledges receipt.
    async fn put(
        &self,
        owner_id: &str,
        payload: ArtifactPayload,
        filename: &str,
        content_type: ContentType,
    ) -> Result<String, BlobError>;

    /// Dereferenceable locator for the blob at `path`, or `None` when the
    /// path does not resolve. Absence is never an error.
    async fn resolve(&self, path: &str) -> Result<Option<String>, BlobError>;

    /// Remove the blob at `path`. Deleting a missing blob is a no-op.
    async fn delete(&self, path: &str) -> Result<(), BlobError>;

    /// Remove every blob under the owner namespace. Idempotent.
    async fn delete_owner(&self, owner_id: &str) -> Result<(), BlobError>;
}

/// Metadata store for cache records and their usage log.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find(&self, key: &CacheKey) -> Result<Option<CacheRecord>, StoreError>;

    /// Persist a new record. Fails with [`StoreError::Duplicate`] when a
    /// record with the same key already exists; uniqueness is enforced here
    /// as the last line of defense even though the orchestrator only inserts
    /// after a confirmed miss.
    async fn insert(&self, record: CacheRecord) -> Result<(), StoreError>;

    /// Append a usage event for `key`. An unknown key is logged and
    /// swallowed: usage accounting must never block the request path.
    async fn increment_usage(&self, key: &CacheKey) -> Result<(), StoreError>;

    /// Number of usage events recorded for `key`; 0 for unknown keys.
    async fn usage_count(&self, key: &CacheKey) -> Result<u64, StoreError>;

    /// Remove the record and its usage events. Idempotent.
    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError>;

    /// Remove every record under the owner namespace. Idempotent.
    async fn delete_owner(&self, owner_id: &str) -> Result<(), StoreError>;
}
