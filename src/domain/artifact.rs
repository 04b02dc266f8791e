//! Generated artifact payloads and their typed attributes.

use std::error::Error as StdError;

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Content types the cache knows how to store. The extension and MIME
/// mappings are total over this set; adding a variant without extending both
/// mappings is a compile error by way of the exhaustive matches below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Mp4,
    Mp3,
    Wav,
    Webm,
    Json,
}

impl ContentType {
    pub fn mime(self) -> &'static str {
        match self {
            ContentType::Mp4 => "video/mp4",
            ContentType::Mp3 => "audio/mpeg",
            ContentType::Wav => "audio/wav",
            ContentType::Webm => "video/webm",
            ContentType::Json => "application/json",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ContentType::Mp4 => "mp4",
            ContentType::Mp3 => "mp3",
            ContentType::Wav => "wav",
            ContentType::Webm => "webm",
            ContentType::Json => "json",
        }
    }

    /// The artifact kind a media payload of this type belongs to. `Json` is
    /// a sidecar type and maps to no kind.
    pub fn kind(self) -> Option<ArtifactKind> {
        match self {
            ContentType::Mp4 | ContentType::Webm => Some(ArtifactKind::Video),
            ContentType::Mp3 | ContentType::Wav => Some(ArtifactKind::Audio),
            ContentType::Json => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Audio,
    Video,
}

/// A timestamped mouth-shape marker aligned to synthesized speech.
///
/// Viseme ids follow the Azure speech-service numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viseme {
    pub offset_ms: i64,
    pub viseme: i32,
}

/// Placement of one spoken word, both in the audio track and in the source
/// text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub offset_ms: i64,
    pub duration_ms: i64,
    pub text_offset: i64,
    pub word_length: i64,
}

/// Technical attributes of a generated media payload. Providers fill in
/// whatever they know; everything is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_rate_hz: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate_kbps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Errors surfaced by a byte stream feeding a blob write.
pub type PayloadStreamError = Box<dyn StdError + Send + Sync>;

/// A media payload, either fully materialized or streamed from the provider.
pub enum ArtifactPayload {
    Bytes(Bytes),
    Stream(BoxStream<'static, Result<Bytes, PayloadStreamError>>),
}

impl ArtifactPayload {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, PayloadStreamError>> + Send + 'static,
    {
        Self::Stream(Box::pin(stream))
    }
}

impl std::fmt::Debug for ArtifactPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactPayload::Bytes(bytes) => {
                f.debug_tuple("Bytes").field(&bytes.len()).finish()
            }
            ArtifactPayload::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for ArtifactPayload {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ArtifactPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for ArtifactPayload {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

/// What a generation provider hands the cache after synthesizing speech or
/// rendering video for one `(owner, text)` pair.
#[derive(Debug)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub payload: ArtifactPayload,
    pub content_type: ContentType,
    pub visemes: Option<Vec<Viseme>>,
    pub word_timestamps: Option<Vec<WordTimestamp>>,
    pub metadata: Option<MediaMetadata>,
}

impl Artifact {
    /// Check that the artifact is internally consistent before anything is
    /// written: the payload must be non-empty (when its size is knowable
    /// up front) and the declared content type must match the artifact kind.
    pub fn validate(&self) -> Result<(), DomainError> {
        if let ArtifactPayload::Bytes(bytes) = &self.payload {
            if bytes.is_empty() {
                return Err(DomainError::validation("artifact payload is empty"));
            }
        }

        match self.content_type.kind() {
            Some(kind) if kind == self.kind => Ok(()),
            Some(kind) => Err(DomainError::validation(format!(
                "content type `{}` carries {kind:?} media but the artifact declares {:?}",
                self.content_type.mime(),
                self.kind,
            ))),
            None => Err(DomainError::validation(format!(
                "content type `{}` is not a media type",
                self.content_type.mime(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_and_mime_mappings_are_total() {
        let all = [
            ContentType::Mp4,
            ContentType::Mp3,
            ContentType::Wav,
            ContentType::Webm,
            ContentType::Json,
        ];
        for content_type in all {
            assert!(!content_type.extension().is_empty());
            assert!(content_type.mime().contains('/'));
        }
        assert_eq!(ContentType::Mp4.extension(), "mp4");
        assert_eq!(ContentType::Mp3.mime(), "audio/mpeg");
    }

    #[test]
    fn audio_artifact_with_video_content_type_is_rejected() {
        let artifact = Artifact {
            kind: ArtifactKind::Audio,
            payload: Bytes::from_static(b"x").into(),
            content_type: ContentType::Mp4,
            visemes: None,
            word_timestamps: None,
            metadata: None,
        };
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn json_is_never_a_primary_media_type() {
        let artifact = Artifact {
            kind: ArtifactKind::Audio,
            payload: Bytes::from_static(b"{}").into(),
            content_type: ContentType::Json,
            visemes: None,
            word_timestamps: None,
            metadata: None,
        };
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn empty_buffered_payload_is_rejected() {
        let artifact = Artifact {
            kind: ArtifactKind::Audio,
            payload: Bytes::new().into(),
            content_type: ContentType::Mp3,
            visemes: None,
            word_timestamps: None,
            metadata: None,
        };
        assert!(artifact.validate().is_err());
    }
}
