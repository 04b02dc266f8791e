//! Cache orchestrator: composes the key hasher, the blob store, and the
//! metadata store into get/put/delete/usage operations.
//!
//! The orchestrator exclusively owns the invariant that a record and its
//! blobs are created and destroyed together. Externally a logical entry is
//! only ever Absent or Present; no intermediate state is observable.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use crate::domain::artifact::{Artifact, ContentType};
use crate::domain::error::DomainError;
use crate::domain::keys::{derive_key, KeyHasher};
use crate::domain::record::{ArtifactUrls, CacheKey, CacheRecord, StoragePaths};

use super::stores::{BlobError, BlobStore, RecordStore, StoreError};

pub(crate) const METRIC_CACHE_PUT_RACE_TOTAL: &str = "parlato_cache_put_race_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cache integrity violated: {message}")]
    Integrity { message: String },
    #[error("invalid artifact: {0}")]
    InvalidArtifact(#[from] DomainError),
    #[error("sidecar serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

/// Content-addressed artifact cache over one blob store and one metadata
/// store. Shared across concurrent calls via `Arc`; no operation holds a
/// cache-wide lock.
pub struct ArtifactCache {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    hasher: Arc<dyn KeyHasher>,
}

impl ArtifactCache {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        hasher: Arc<dyn KeyHasher>,
    ) -> Self {
        Self {
            blobs,
            records,
            hasher,
        }
    }

    /// Key the given `(owner, text)` pair addresses. The same hasher instance
    /// serves `get` and `put`, so the derivation is stable for the lifetime
    /// of the cache.
    pub fn key_for(&self, owner_id: &str, text: &str) -> CacheKey {
        derive_key(self.hasher.as_ref(), owner_id, text)
    }

    /// Look up the record for `(owner, text)`. `None` is an ordinary miss.
    pub async fn get(
        &self,
        owner_id: &str,
        text: &str,
    ) -> Result<Option<CacheRecord>, CacheError> {
        let key = self.key_for(owner_id, text);
        Ok(self.records.find(&key).await?)
    }

    /// Resolve every stored path of `record` into an externally consumable
    /// locator.
    ///
    /// A record whose media path no longer resolves is a desynchronization
    /// between the stores, surfaced loudly as [`CacheError::Integrity`] and
    /// never as a miss: serving nothing is better than guessing.
    pub async fn urls(&self, record: &CacheRecord) -> Result<ArtifactUrls, CacheError> {
        let paths = &record.storage_paths;

        let media_url = match self.blobs.resolve(&paths.media_path).await? {
            Some(url) => url,
            None => {
                error!(
                    key = %record.key,
                    owner_id = %record.owner_id,
                    media_path = %paths.media_path,
                    "cache record references a media blob that does not resolve"
                );
                return Err(CacheError::integrity(format!(
                    "record `{}` exists but its media blob does not resolve",
                    record.key
                )));
            }
        };

        let visemes_url = self.resolve_sidecar(record, paths.visemes_path.as_deref()).await?;
        let word_timestamps_url = self
            .resolve_sidecar(record, paths.word_timestamps_path.as_deref())
            .await?;

        Ok(ArtifactUrls {
            media_url,
            visemes_url,
            word_timestamps_url,
        })
    }

    async fn resolve_sidecar(
        &self,
        record: &CacheRecord,
        path: Option<&str>,
    ) -> Result<Option<String>, CacheError> {
        let Some(path) = path else {
            return Ok(None);
        };
        let url = self.blobs.resolve(path).await?;
        if url.is_none() {
            warn!(key = %record.key, path, "cache sidecar blob does not resolve");
        }
        Ok(url)
    }

    /// Store a freshly generated artifact for `(owner, text)` and persist its
    /// record.
    ///
    /// Blobs are written before the record so that a failure mid-way leaves
    /// orphaned storage rather than a record pointing at nothing: the former
    /// is wasted space, the latter breaks the integrity invariant. Losing the
    /// insert race to a concurrent put for the same key is not an error; the
    /// winner's record is re-fetched and returned.
    pub async fn put(
        &self,
        owner_id: &str,
        text: &str,
        artifact: Artifact,
    ) -> Result<CacheRecord, CacheError> {
        artifact.validate()?;

        let key = self.key_for(owner_id, text);
        let Artifact {
            payload,
            content_type,
            visemes,
            word_timestamps,
            metadata,
            ..
        } = artifact;

        let media_path = self
            .blobs
            .put(
                owner_id,
                payload,
                &key.media_filename(content_type),
                content_type,
            )
            .await?;

        let mut written = vec![media_path.clone()];

        let visemes_path = match visemes {
            Some(visemes) => {
                let path = self
                    .put_sidecar(&key, owner_id, &key.visemes_filename(), &visemes, &written)
                    .await?;
                written.push(path.clone());
                Some(path)
            }
            None => None,
        };

        let word_timestamps_path = match word_timestamps {
            Some(timestamps) => {
                let path = self
                    .put_sidecar(
                        &key,
                        owner_id,
                        &key.word_timestamps_filename(),
                        &timestamps,
                        &written,
                    )
                    .await?;
                written.push(path.clone());
                Some(path)
            }
            None => None,
        };

        let record = CacheRecord {
            key: key.clone(),
            owner_id: owner_id.to_owned(),
            source_text: text.to_owned(),
            storage_paths: StoragePaths {
                media_path,
                visemes_path,
                word_timestamps_path,
            },
            metadata,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };

        match self.records.insert(record.clone()).await {
            Ok(()) => Ok(record),
            Err(StoreError::Duplicate { .. }) => {
                // Someone else won the race for this key. The loser's blobs
                // landed on the same key-derived paths with equivalent
                // content, so nothing needs rolling back.
                counter!(METRIC_CACHE_PUT_RACE_TOTAL).increment(1);
                debug!(key = %key, owner_id, "lost cache put race; adopting winner's record");
                match self.records.find(&key).await? {
                    Some(winner) => Ok(winner),
                    None => Err(CacheError::integrity(format!(
                        "record `{key}` vanished between duplicate insert and re-read"
                    ))),
                }
            }
            Err(err) => {
                self.discard_blobs(&key, &written).await;
                Err(err.into())
            }
        }
    }

    /// Serialize a sidecar payload as JSON and write it next to the media
    /// blob. A failure fails the whole put: the blobs written so far are
    /// discarded and no record is persisted.
    async fn put_sidecar<T: serde::Serialize>(
        &self,
        key: &CacheKey,
        owner_id: &str,
        filename: &str,
        payload: &T,
        written: &[String],
    ) -> Result<String, CacheError> {
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.discard_blobs(key, written).await;
                return Err(err.into());
            }
        };

        match self
            .blobs
            .put(
                owner_id,
                Bytes::from(bytes).into(),
                filename,
                ContentType::Json,
            )
            .await
        {
            Ok(path) => Ok(path),
            Err(err) => {
                self.discard_blobs(key, written).await;
                Err(err.into())
            }
        }
    }

    async fn discard_blobs(&self, key: &CacheKey, paths: &[String]) {
        for path in paths {
            if let Err(err) = self.blobs.delete(path).await {
                warn!(key = %key, path = %path, error = %err, "failed to discard orphaned blob");
            }
        }
    }

    /// Delete the record for `key` along with its blobs. A missing record is
    /// a no-op. Blob deletions are best-effort and independent: a failed one
    /// is logged and the rest still run, so stale metadata never lingers to
    /// block a future put with a duplicate key.
    pub async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        let Some(record) = self.records.find(key).await? else {
            return Ok(());
        };

        let paths = &record.storage_paths;
        let mut targets = vec![paths.media_path.as_str()];
        targets.extend(paths.visemes_path.as_deref());
        targets.extend(paths.word_timestamps_path.as_deref());

        for path in targets {
            if let Err(err) = self.blobs.delete(path).await {
                warn!(key = %key, path, error = %err, "blob delete failed; continuing");
            }
        }

        self.records.delete(key).await?;
        Ok(())
    }

    /// Delete every record and blob under the owner namespace. Both stores'
    /// bulk deletes are idempotent and owner-scoped, so ordering is free.
    pub async fn delete_owner(&self, owner_id: &str) -> Result<(), CacheError> {
        self.blobs.delete_owner(owner_id).await?;
        self.records.delete_owner(owner_id).await?;
        Ok(())
    }

    /// Append a usage event for `key`.
    pub async fn increment_usage(&self, key: &CacheKey) -> Result<(), CacheError> {
        Ok(self.records.increment_usage(key).await?)
    }

    /// Number of recorded usages for `key`; 0 when the key is unknown.
    pub async fn usage_count(&self, key: &CacheKey) -> Result<u64, CacheError> {
        Ok(self.records.usage_count(key).await?)
    }
}
