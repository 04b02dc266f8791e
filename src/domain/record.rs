//! Cache records and their derived filenames.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::artifact::{ContentType, MediaMetadata};

/// Content-derived key identifying one cached artifact. Unique per
/// `(owner, text)` pair; lookup goes through the key, never the source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename of the primary media blob under the owner namespace.
    pub fn media_filename(&self, content_type: ContentType) -> String {
        format!("{}.{}", self.0, content_type.extension())
    }

    /// Filename of the visemes sidecar blob.
    pub fn visemes_filename(&self) -> String {
        format!("{}-visemes.json", self.0)
    }

    /// Filename of the word-timestamps sidecar blob.
    pub fn word_timestamps_filename(&self) -> String {
        format!("{}-word-timestamps.json", self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend-opaque paths of the blobs belonging to one record. Only valid in
/// combination with the blob store implementation that produced them.
///
/// The sidecar paths are present iff the generated artifact carried the
/// corresponding payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePaths {
    pub media_path: String,
    pub visemes_path: Option<String>,
    pub word_timestamps_path: Option<String>,
}

/// One cached artifact as persisted in the metadata store.
///
/// A record exists iff its `media_path` resolves to a live blob. Records are
/// never mutated after insertion; usage accounting lives in a separate
/// append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: CacheKey,
    /// Avatar/tenant namespace; also the blob folder, which is what makes
    /// owner-scoped bulk deletion possible.
    pub owner_id: String,
    /// Retained for debugging and audit only.
    pub source_text: String,
    pub storage_paths: StoragePaths,
    pub metadata: Option<MediaMetadata>,
    pub created_at: OffsetDateTime,
    pub updated_at: Option<OffsetDateTime>,
}

/// One usage of a cached artifact. Append-only; removed only by the owning
/// record's cascading delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub record_key: CacheKey,
    pub recorded_at: OffsetDateTime,
}

/// Externally consumable locators for a record's blobs: filesystem paths for
/// the local backend, short-lived signed URLs for remote backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactUrls {
    pub media_url: String,
    pub visemes_url: Option<String>,
    pub word_timestamps_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_filenames_embed_the_key() {
        let key = CacheKey::new("abc123");
        assert_eq!(key.media_filename(ContentType::Mp3), "abc123.mp3");
        assert_eq!(key.visemes_filename(), "abc123-visemes.json");
        assert_eq!(
            key.word_timestamps_filename(),
            "abc123-word-timestamps.json"
        );
    }
}
