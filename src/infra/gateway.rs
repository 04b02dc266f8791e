//! Remote object-gateway blob store.
//!
//! Blobs are PUT/DELETEd against an HTTP object gateway; reads hand out
//! short-lived signed URLs computed client-side from the shared account key
//! (SAS style), so playback clients stream straight from the gateway without
//! transiting this process.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{header::CONTENT_TYPE, Body, StatusCode};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::application::stores::{BlobError, BlobStore};
use crate::domain::artifact::{ArtifactPayload, ContentType};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// Connection parameters for the object gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base endpoint, e.g. `https://blobs.example.net`.
    pub endpoint: String,
    /// Container all cache blobs live under.
    pub container: String,
    /// Shared key used to sign read URLs.
    pub account_key: Vec<u8>,
    /// Signed-URL lifetime. Artifacts are read shortly after generation, so
    /// the default of one hour is generous.
    pub url_ttl: Duration,
}

impl GatewayConfig {
    pub fn new(endpoint: impl Into<String>, container: impl Into<String>, account_key: Vec<u8>) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            container: container.into(),
            account_key,
            url_ttl: DEFAULT_URL_TTL,
        }
    }
}

pub struct GatewayBlobStore {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayBlobStore {
    pub fn new(http: reqwest::Client, config: GatewayConfig) -> Self {
        Self { http, config }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.endpoint, self.config.container, path
        )
    }

    fn signed_url(&self, path: &str, expires_at: OffsetDateTime) -> String {
        sign_read_url(
            &self.config.endpoint,
            &self.config.container,
            path,
            &self.config.account_key,
            expires_at,
        )
    }

    fn transport(err: reqwest::Error) -> BlobError {
        BlobError::unavailable(err.to_string())
    }

    fn unexpected(status: StatusCode, path: &str) -> BlobError {
        BlobError::unavailable(format!("gateway returned {status} for `{path}`"))
    }
}

/// Compute a time-limited read URL: `?se=` carries the expiry and `?sig=` an
/// HMAC-SHA256 over the method, the container-scoped path, and the expiry.
fn sign_read_url(
    endpoint: &str,
    container: &str,
    path: &str,
    account_key: &[u8],
    expires_at: OffsetDateTime,
) -> String {
    let expiry = expires_at.unix_timestamp();
    let canonical = format!("GET\n{container}/{path}\n{expiry}");

    let mut mac = HmacSha256::new_from_slice(account_key).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{endpoint}/{container}/{path}?se={expiry}&sig={signature}")
}

#[async_trait]
impl BlobStore for GatewayBlobStore {
    async fn put(
        &self,
        owner_id: &str,
        payload: ArtifactPayload,
        filename: &str,
        content_type: ContentType,
    ) -> Result<String, BlobError> {
        let path = format!("{owner_id}/{filename}");
        let body = match payload {
            ArtifactPayload::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(BlobError::EmptyPayload);
                }
                Body::from(bytes)
            }
            ArtifactPayload::Stream(stream) => Body::wrap_stream(stream),
        };

        let response = self
            .http
            .put(self.object_url(&path))
            .header(CONTENT_TYPE, content_type.mime())
            .body(body)
            .send()
            .await
            .map_err(Self::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::unexpected(status, &path));
        }

        Ok(path)
    }

    async fn resolve(&self, path: &str) -> Result<Option<String>, BlobError> {
        let response = self
            .http
            .head(self.object_url(path))
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            status if status.is_success() => {
                let expires_at = OffsetDateTime::now_utc() + self.config.url_ttl;
                Ok(Some(self.signed_url(path, expires_at)))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Self::unexpected(status, path)),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let response = self
            .http
            .delete(self.object_url(path))
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(Self::unexpected(status, path)),
        }
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<(), BlobError> {
        let url = format!(
            "{}/{}/{}?recursive=true",
            self.config.endpoint, self.config.container, owner_id
        );
        let response = self.http.delete(url).send().await.map_err(Self::transport)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(Self::unexpected(status, owner_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn signed_urls_are_deterministic_for_fixed_expiry() {
        let expires = datetime!(2024-06-01 12:00:00 UTC);
        let first = sign_read_url("https://blobs.example.net", "avatars", "a1/k.mp3", b"key", expires);
        let second = sign_read_url("https://blobs.example.net", "avatars", "a1/k.mp3", b"key", expires);
        assert_eq!(first, second);
    }

    #[test]
    fn signed_url_carries_expiry_and_signature() {
        let expires = datetime!(2024-06-01 12:00:00 UTC);
        let url = sign_read_url("https://blobs.example.net", "avatars", "a1/k.mp3", b"key", expires);
        assert!(url.starts_with("https://blobs.example.net/avatars/a1/k.mp3?se="));
        assert!(url.contains(&format!("se={}", expires.unix_timestamp())));
        assert!(url.contains("&sig="));
    }

    #[test]
    fn signature_depends_on_key_and_path() {
        let expires = datetime!(2024-06-01 12:00:00 UTC);
        let base = sign_read_url("https://e", "c", "a1/k.mp3", b"key", expires);
        assert_ne!(base, sign_read_url("https://e", "c", "a1/k.mp3", b"other", expires));
        assert_ne!(base, sign_read_url("https://e", "c", "a1/other.mp3", b"key", expires));
    }
}
