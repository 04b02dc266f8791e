//! Cache-aside speak orchestration.
//!
//! A speak call resolves one `(owner, text)` pair to consumable URLs: check
//! the cache, on a miss ask the generation gateway for a fresh artifact and
//! populate the cache, then record the usage either way.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::artifact::{Artifact, ArtifactKind, ContentType, MediaMetadata};
use crate::domain::error::DomainError;
use crate::domain::record::{ArtifactUrls, CacheRecord};

use super::cache::{ArtifactCache, CacheError};
use super::singleflight::SingleFlight;

pub(crate) const METRIC_SPEAK_HIT_TOTAL: &str = "parlato_speak_hit_total";
pub(crate) const METRIC_SPEAK_MISS_TOTAL: &str = "parlato_speak_miss_total";
pub(crate) const METRIC_USAGE_LOG_FAILURE_TOTAL: &str = "parlato_usage_log_failure_total";
pub(crate) const METRIC_GENERATE_MS: &str = "parlato_generate_ms";

/// Failure inside a generation provider. Providers classify their own
/// errors; this layer performs no retries.
#[derive(Debug, Error)]
#[error("provider `{provider}` failed: {message}")]
pub struct GenerationError {
    pub provider: String,
    pub message: String,
}

impl GenerationError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// The capability the cache consumes from speech/video providers: turn text
/// plus provider settings into an artifact. Called only on a cache miss.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        text: &str,
        settings: &ProviderSettings,
    ) -> Result<Artifact, GenerationError>;
}

/// Supported audio container formats for synthesized speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn content_type(self) -> ContentType {
        match self {
            AudioFormat::Mp3 => ContentType::Mp3,
            AudioFormat::Wav => ContentType::Wav,
        }
    }
}

/// Supported video container formats for rendered avatars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    Mp4,
    Webm,
}

impl VideoFormat {
    pub fn content_type(self) -> ContentType {
        match self {
            VideoFormat::Mp4 => ContentType::Mp4,
            VideoFormat::Webm => ContentType::Webm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    Vp9,
    H264,
    Hevc,
}

/// Settings for an audio (speech-only) provider.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AudioSettings {
    pub voice: String,
    pub visemes: bool,
    pub word_timestamps: bool,
    pub streaming: bool,
    pub sampling_rate_hz: u32,
    pub bit_rate_kbps: u32,
    pub format: AudioFormat,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            voice: String::new(),
            visemes: false,
            word_timestamps: false,
            streaming: false,
            sampling_rate_hz: 16_000,
            bit_rate_kbps: 32,
            format: AudioFormat::Mp3,
        }
    }
}

/// Settings for a video (rendered avatar) provider.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VideoSettings {
    pub word_timestamps: bool,
    pub streaming: bool,
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
    pub format: VideoFormat,
    pub codec: VideoCodec,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            word_timestamps: false,
            streaming: false,
            frame_rate: 30,
            width: 640,
            height: 480,
            format: VideoFormat::Mp4,
            codec: VideoCodec::Hevc,
        }
    }
}

/// Provider settings as a tagged sum: dispatch happens on the variant, and
/// each variant validates itself.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderSettings {
    Audio(AudioSettings),
    Video(VideoSettings),
}

impl ProviderSettings {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ProviderSettings::Audio(_) => ArtifactKind::Audio,
            ProviderSettings::Video(_) => ArtifactKind::Video,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            ProviderSettings::Audio(audio) => {
                if audio.voice.trim().is_empty() {
                    return Err(DomainError::validation("audio voice must not be empty"));
                }
                if audio.sampling_rate_hz == 0 {
                    return Err(DomainError::validation("sampling rate must be positive"));
                }
                Ok(())
            }
            ProviderSettings::Video(video) => {
                if video.width == 0 || video.height == 0 {
                    return Err(DomainError::validation(
                        "video dimensions must be positive",
                    ));
                }
                if video.frame_rate == 0 {
                    return Err(DomainError::validation("frame rate must be positive"));
                }
                Ok(())
            }
        }
    }
}

/// A resolved speaking-avatar artifact: what the caller plays back.
#[derive(Debug, Clone, PartialEq)]
pub struct SpokenArtifact {
    pub kind: ArtifactKind,
    pub urls: ArtifactUrls,
    pub metadata: Option<MediaMetadata>,
}

#[derive(Debug, Error)]
pub enum SpeakError {
    #[error("invalid provider settings: {0}")]
    InvalidSettings(#[from] DomainError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Cache-aside control flow tying a [`GenerationGateway`] to the
/// [`ArtifactCache`].
pub struct Speaker {
    cache: Arc<ArtifactCache>,
    flights: SingleFlight,
}

impl Speaker {
    pub fn new(cache: Arc<ArtifactCache>) -> Self {
        Self {
            cache,
            flights: SingleFlight::new(),
        }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Resolve `(owner, text)` to playable URLs, generating and caching the
    /// artifact on a miss. Usage is recorded on every resolved request, hit
    /// or miss; a usage-accounting failure is telemetry loss, not a request
    /// failure.
    pub async fn speak(
        &self,
        owner_id: &str,
        text: &str,
        gateway: &dyn GenerationGateway,
        settings: &ProviderSettings,
    ) -> Result<SpokenArtifact, SpeakError> {
        settings.validate()?;
        let kind = settings.kind();

        let record = match self.cache.get(owner_id, text).await? {
            Some(record) => {
                counter!(METRIC_SPEAK_HIT_TOTAL).increment(1);
                debug!(owner_id, key = %record.key, "cache hit");
                record
            }
            None => self.generate_and_store(owner_id, text, gateway, settings).await?,
        };

        let urls = self.cache.urls(&record).await?;

        if let Err(err) = self.cache.increment_usage(&record.key).await {
            counter!(METRIC_USAGE_LOG_FAILURE_TOTAL).increment(1);
            warn!(key = %record.key, error = %err, "usage accounting failed; continuing");
        }

        Ok(SpokenArtifact {
            kind,
            urls,
            metadata: record.metadata,
        })
    }

    /// Miss path, held under the per-key flight lock so concurrent identical
    /// requests trigger a single generation.
    async fn generate_and_store(
        &self,
        owner_id: &str,
        text: &str,
        gateway: &dyn GenerationGateway,
        settings: &ProviderSettings,
    ) -> Result<CacheRecord, SpeakError> {
        let key = self.cache.key_for(owner_id, text);
        let _flight = self.flights.acquire(key.as_str()).await;

        // Another flight may have populated the entry while we waited.
        if let Some(record) = self.cache.get(owner_id, text).await? {
            counter!(METRIC_SPEAK_HIT_TOTAL).increment(1);
            debug!(owner_id, key = %record.key, "cache hit after waiting on in-flight miss");
            return Ok(record);
        }

        counter!(METRIC_SPEAK_MISS_TOTAL).increment(1);
        let started = Instant::now();
        let artifact = gateway.generate(text, settings).await?;
        histogram!(METRIC_GENERATE_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        info!(
            owner_id,
            key = %key,
            provider = gateway.name(),
            "generated artifact on cache miss"
        );

        Ok(self.cache.put(owner_id, text, artifact).await?)
    }
}
