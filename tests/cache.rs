//! End-to-end cache orchestrator behavior over the filesystem blob store and
//! the in-memory metadata store.

use std::sync::Arc;

use bytes::Bytes;
use parlato::application::cache::{ArtifactCache, CacheError};
use parlato::domain::artifact::{
    Artifact, ArtifactKind, ContentType, MediaMetadata, Viseme, WordTimestamp,
};
use parlato::domain::keys::Sha256Hasher;
use parlato::infra::blobs::FsBlobStore;
use parlato::infra::memory::MemRecordStore;

fn cache(dir: &tempfile::TempDir) -> ArtifactCache {
    let blobs = Arc::new(FsBlobStore::new(dir.path().to_path_buf()).expect("blob root"));
    ArtifactCache::new(
        blobs,
        Arc::new(MemRecordStore::new()),
        Arc::new(Sha256Hasher),
    )
}

fn mp3_artifact(body: &'static [u8]) -> Artifact {
    Artifact {
        kind: ArtifactKind::Audio,
        payload: Bytes::from_static(body).into(),
        content_type: ContentType::Mp3,
        visemes: None,
        word_timestamps: None,
        metadata: None,
    }
}

fn mp3_artifact_with_sidecars(body: &'static [u8]) -> Artifact {
    Artifact {
        visemes: Some(vec![Viseme {
            offset_ms: 0,
            viseme: 21,
        }]),
        word_timestamps: Some(vec![WordTimestamp {
            word: "hello".to_string(),
            offset_ms: 0,
            duration_ms: 420,
            text_offset: 0,
            word_length: 5,
        }]),
        metadata: Some(MediaMetadata {
            duration_seconds: Some(0.42),
            sampling_rate_hz: Some(16_000),
            bit_rate_kbps: Some(32),
            ..Default::default()
        }),
        ..mp3_artifact(body)
    }
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    let stored = cache
        .put("a1", "hello", mp3_artifact(b"media"))
        .await
        .expect("put");

    let fetched = cache
        .get("a1", "hello")
        .await
        .expect("get")
        .expect("record present");

    assert_eq!(fetched.key, cache.key_for("a1", "hello"));
    assert_eq!(fetched.owner_id, "a1");
    assert_eq!(fetched.source_text, "hello");
    assert_eq!(fetched, stored);

    let urls = cache.urls(&fetched).await.expect("urls");
    assert!(!urls.media_url.is_empty());
    assert_eq!(
        tokio::fs::read(&urls.media_url).await.expect("media file"),
        b"media".to_vec()
    );
}

#[tokio::test]
async fn sidecar_paths_mirror_the_artifact_payloads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    // Visemes present, word timestamps absent.
    let record = cache
        .put(
            "a1",
            "hello",
            Artifact {
                visemes: Some(vec![Viseme {
                    offset_ms: 0,
                    viseme: 21,
                }]),
                ..mp3_artifact(b"x")
            },
        )
        .await
        .expect("put");

    assert!(record.storage_paths.visemes_path.is_some());
    assert!(record.storage_paths.word_timestamps_path.is_none());

    let urls = cache.urls(&record).await.expect("urls");
    assert!(!urls.media_url.is_empty());
    let visemes_url = urls.visemes_url.expect("visemes url");
    assert!(urls.word_timestamps_url.is_none());

    let visemes: Vec<Viseme> = serde_json::from_slice(
        &tokio::fs::read(&visemes_url).await.expect("visemes file"),
    )
    .expect("visemes json");
    assert_eq!(
        visemes,
        vec![Viseme {
            offset_ms: 0,
            viseme: 21
        }]
    );
}

#[tokio::test]
async fn record_metadata_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    let record = cache
        .put("a1", "hello", mp3_artifact_with_sidecars(b"x"))
        .await
        .expect("put");

    let metadata = record.metadata.expect("metadata");
    assert_eq!(metadata.duration_seconds, Some(0.42));
    assert_eq!(metadata.sampling_rate_hz, Some(16_000));
}

#[tokio::test]
async fn get_of_unknown_pair_is_a_miss_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);
    assert!(cache.get("a1", "never stored").await.expect("get").is_none());
}

#[tokio::test]
async fn delete_is_idempotent_and_removes_blobs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    let record = cache
        .put("a1", "hello", mp3_artifact_with_sidecars(b"x"))
        .await
        .expect("put");
    let media_path = dir.path().join(&record.storage_paths.media_path);
    assert!(media_path.exists());

    cache.delete(&record.key).await.expect("first delete");
    cache.delete(&record.key).await.expect("second delete");

    assert!(cache.get("a1", "hello").await.expect("get").is_none());
    assert!(!media_path.exists());
}

#[tokio::test]
async fn delete_owner_is_scoped_to_the_namespace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    for text in ["one", "two", "three"] {
        cache
            .put("a1", text, mp3_artifact(b"x"))
            .await
            .expect("put a1");
    }
    let survivor = cache
        .put("a2", "one", mp3_artifact(b"y"))
        .await
        .expect("put a2");

    cache.delete_owner("a1").await.expect("delete owner");
    cache.delete_owner("a1").await.expect("idempotent");

    for text in ["one", "two", "three"] {
        assert!(cache.get("a1", text).await.expect("get").is_none());
    }

    let record = cache
        .get("a2", "one")
        .await
        .expect("get")
        .expect("a2 untouched");
    assert_eq!(record, survivor);
    assert!(!cache.urls(&record).await.expect("urls").media_url.is_empty());
}

#[tokio::test]
async fn degenerate_owner_delete_leaves_other_namespaces_intact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    let record = cache
        .put("a1", "hello", mp3_artifact(b"media"))
        .await
        .expect("put");

    // An empty or dot owner id must not collapse onto the storage root and
    // take every owner's blobs with it.
    for owner in ["", "."] {
        assert!(cache.delete_owner(owner).await.is_err());
    }

    let urls = cache.urls(&record).await.expect("urls");
    assert_eq!(
        tokio::fs::read(&urls.media_url).await.expect("media file"),
        b"media".to_vec()
    );
}

#[tokio::test]
async fn usage_counts_increase_by_one_per_increment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    let record = cache
        .put("a1", "hello", mp3_artifact(b"x"))
        .await
        .expect("put");

    assert_eq!(cache.usage_count(&record.key).await.expect("count"), 0);
    cache.increment_usage(&record.key).await.expect("increment");
    cache.increment_usage(&record.key).await.expect("increment");
    assert_eq!(cache.usage_count(&record.key).await.expect("count"), 2);

    // Unknown keys count zero and increments against them are swallowed.
    let unknown = cache.key_for("a1", "never stored");
    assert_eq!(cache.usage_count(&unknown).await.expect("count"), 0);
    cache.increment_usage(&unknown).await.expect("swallowed");
    assert_eq!(cache.usage_count(&unknown).await.expect("count"), 0);
}

#[tokio::test]
async fn concurrent_puts_for_one_key_converge_on_a_single_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    let (first, second) = tokio::join!(
        cache.put("a1", "hello", mp3_artifact(b"x")),
        cache.put("a1", "hello", mp3_artifact(b"x")),
    );

    let first = first.expect("first put");
    let second = second.expect("second put");
    assert_eq!(first, second);

    let record = cache
        .get("a1", "hello")
        .await
        .expect("get")
        .expect("record present");
    assert_eq!(record, first);
    assert!(!cache.urls(&record).await.expect("urls").media_url.is_empty());
}

#[tokio::test]
async fn duplicate_put_after_completion_adopts_the_existing_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    let original = cache
        .put("a1", "hello", mp3_artifact(b"x"))
        .await
        .expect("first put");
    let repeat = cache
        .put("a1", "hello", mp3_artifact(b"x"))
        .await
        .expect("repeat put");

    assert_eq!(original, repeat);
}

#[tokio::test]
async fn missing_media_blob_is_an_integrity_failure_not_a_miss() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    let record = cache
        .put("a1", "hello", mp3_artifact(b"x"))
        .await
        .expect("put");

    // Simulate external deletion of the blob behind the cache's back.
    std::fs::remove_file(dir.path().join(&record.storage_paths.media_path))
        .expect("remove media blob");

    assert!(matches!(
        cache.urls(&record).await,
        Err(CacheError::Integrity { .. })
    ));
}

#[tokio::test]
async fn invalid_artifacts_are_rejected_before_any_write() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = cache(&dir);

    let mismatched = Artifact {
        content_type: ContentType::Mp4,
        ..mp3_artifact(b"x")
    };
    assert!(matches!(
        cache.put("a1", "hello", mismatched).await,
        Err(CacheError::InvalidArtifact(_))
    ));
    assert!(cache.get("a1", "hello").await.expect("get").is_none());
}

#[tokio::test]
async fn keys_are_stable_across_cache_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = cache(&dir);
    let second = cache(&dir);

    // Same derivation across instances is what keeps records reachable
    // after a process restart.
    assert_eq!(first.key_for("a1", "hello"), second.key_for("a1", "hello"));
    assert_eq!(
        first.key_for("a1", "hello").as_str(),
        "b9a2e881a29236df0817d2cfd01cc5e9d3cd018ee8bc00854697629be062d88f"
    );
}
