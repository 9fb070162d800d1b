// Profile picture proxy with a time-boxed cache
// Decision: Entries are refreshed in place once older than the TTL, never deleted
// Decision: Concurrent misses may both fetch and write; last writer wins

use std::time::Duration;

use chrono::Utc;
use otter_core::ApiError;

use crate::storage::{StorageBackend, UpsertImageCacheRow};

/// Content type used when the remote host does not send one
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Largest remote image accepted
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Image bytes ready to be served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub content_type: String,
    pub data: Vec<u8>,
}

pub struct ProfilePictures {
    db: StorageBackend,
    http: reqwest::Client,
    ttl: Duration,
    max_bytes: usize,
}

impl ProfilePictures {
    pub fn new(db: StorageBackend, ttl: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            db,
            http,
            ttl,
            max_bytes: MAX_IMAGE_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Serve from cache while fresh, otherwise fetch and store
    pub async fn get(&self, image_url: &str) -> Result<CachedImage, ApiError> {
        let cached = self.db.get_cached_image(image_url).await?;
        if let Some(row) = &cached {
            if row.is_fresh(Utc::now(), self.ttl.as_secs() as i64) {
                tracing::debug!(url = %image_url, "Profile picture cache hit");
                return Ok(CachedImage {
                    content_type: row.content_type.clone(),
                    data: row.data.clone(),
                });
            }
        }

        let image = match self.fetch(image_url).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(url = %image_url, error = %e, "Failed to fetch profile picture");
                return Err(ApiError::UpstreamUnavailable);
            }
        };

        // A failed cache write must not fail the request
        if let Err(e) = self
            .db
            .upsert_cached_image(UpsertImageCacheRow {
                image_url: image_url.to_string(),
                data: image.data.clone(),
                content_type: image.content_type.clone(),
            })
            .await
        {
            tracing::warn!(url = %image_url, error = %e, "Failed to cache profile picture");
        }

        Ok(image)
    }

    async fn fetch(&self, image_url: &str) -> anyhow::Result<CachedImage> {
        let mut response = self.http.get(image_url).send().await?.error_for_status()?;
        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                anyhow::bail!("image is {len} bytes, limit is {}", self.max_bytes);
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        // Content-Length may be absent or wrong, so count while reading
        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if data.len() + chunk.len() > self.max_bytes {
                anyhow::bail!("image exceeds {} bytes", self.max_bytes);
            }
            data.extend_from_slice(&chunk);
        }
        Ok(CachedImage { content_type, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png() -> Vec<u8> {
        vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff]
    }

    #[tokio::test]
    async fn test_fetches_once_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/avatar.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(png(), "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let pictures =
            ProfilePictures::new(StorageBackend::in_memory(), Duration::from_secs(3600)).unwrap();
        let url = format!("{}/avatar.png", server.uri());

        let first = pictures.get(&url).await.unwrap();
        let second = pictures.get(&url).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.content_type, "image/png");
        assert_eq!(first.data, png());
    }

    #[tokio::test]
    async fn test_refetches_after_ttl() {
        let server = MockServer::start().await;
        Mock::given(path("/avatar.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(png(), "image/png"))
            .expect(2)
            .mount(&server)
            .await;

        // Zero TTL: every cached copy is already stale
        let pictures =
            ProfilePictures::new(StorageBackend::in_memory(), Duration::from_secs(0)).unwrap();
        let url = format!("{}/avatar.png", server.uri());

        pictures.get(&url).await.unwrap();
        pictures.get(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_image_is_rejected_and_not_cached() {
        let server = MockServer::start().await;
        Mock::given(path("/huge.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 64], "image/png"))
            .expect(2)
            .mount(&server)
            .await;

        let pictures =
            ProfilePictures::new(StorageBackend::in_memory(), Duration::from_secs(3600))
                .unwrap()
                .with_max_bytes(32);
        let url = format!("{}/huge.png", server.uri());

        for _ in 0..2 {
            let result = pictures.get(&url).await;
            assert!(matches!(result, Err(ApiError::UpstreamUnavailable)));
        }
    }

    #[tokio::test]
    async fn test_upstream_error_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let pictures =
            ProfilePictures::new(StorageBackend::in_memory(), Duration::from_secs(3600)).unwrap();
        let result = pictures.get(&format!("{}/missing.png", server.uri())).await;
        assert!(matches!(result, Err(ApiError::UpstreamUnavailable)));
    }
}
