//! Avatar retrieval
//!
//! Avatars arrive as references: `http(s)://` URLs or `data:image/...;base64,`
//! inline payloads. They are resolved after admission and before generation.

use async_trait::async_trait;
use base64::Engine;
use futures::future::try_join_all;
use image::{DynamicImage, GenericImageView};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Avatar fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Unsupported image reference: {0}")]
    UnsupportedReference(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to fetch image: HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Image exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("Invalid inline image data: {0}")]
    InlineData(#[from] base64::DecodeError),
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Resolves an avatar reference to a decoded image
#[async_trait]
pub trait AvatarSource: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<DynamicImage, FetchError>;
}

/// Resolve references concurrently, preserving order
pub async fn fetch_all(
    source: &dyn AvatarSource,
    references: &[String],
) -> Result<Vec<DynamicImage>, FetchError> {
    try_join_all(references.iter().map(|reference| source.fetch(reference))).await
}

/// Downloads avatars over HTTP and decodes inline data URIs
pub struct HttpAvatarSource {
    http_client: reqwest::Client,
    max_bytes: usize,
}

impl HttpAvatarSource {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("meme-forge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(HttpAvatarSource {
            http_client,
            max_bytes,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(url = %url, "Fetching avatar");

        let response = self.http_client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(FetchError::TooLarge { limit: self.max_bytes });
        }

        let bytes = response.bytes().await?;
        if bytes.len() > self.max_bytes {
            return Err(FetchError::TooLarge { limit: self.max_bytes });
        }

        Ok(bytes.to_vec())
    }
}

/// Payload of a base64 `data:image/...` URI
fn decode_data_uri(reference: &str) -> Option<Result<Vec<u8>, FetchError>> {
    let rest = reference.strip_prefix("data:image/")?;
    let (_, payload) = rest.split_once(";base64,")?;
    Some(
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(FetchError::from),
    )
}

#[async_trait]
impl AvatarSource for HttpAvatarSource {
    async fn fetch(&self, reference: &str) -> Result<DynamicImage, FetchError> {
        let bytes = if let Some(decoded) = decode_data_uri(reference) {
            let bytes = decoded?;
            if bytes.len() > self.max_bytes {
                return Err(FetchError::TooLarge { limit: self.max_bytes });
            }
            bytes
        } else {
            let url = url::Url::parse(reference)
                .map_err(|_| FetchError::UnsupportedReference(reference.to_string()))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(FetchError::UnsupportedReference(reference.to_string()));
            }
            self.download(url.as_str()).await?
        };

        let image = image::load_from_memory(&bytes)?;
        debug!(width = image.width(), height = image.height(), "Avatar decoded");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_data_uri() -> String {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([0, 255, 0, 255])));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageOutputFormat::Png).unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(buffer.into_inner())
        )
    }

    fn source() -> HttpAvatarSource {
        HttpAvatarSource::new(Duration::from_secs(1), 1024 * 1024).unwrap()
    }

    #[tokio::test]
    async fn test_inline_data_uri_decodes() {
        let image = source().fetch(&png_data_uri()).await.unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
    }

    #[tokio::test]
    async fn test_inline_data_respects_size_limit() {
        let tiny = HttpAvatarSource::new(Duration::from_secs(1), 8).unwrap();
        assert!(matches!(
            tiny.fetch(&png_data_uri()).await,
            Err(FetchError::TooLarge { limit: 8 })
        ));
    }

    #[tokio::test]
    async fn test_rejects_non_http_references() {
        assert!(matches!(
            source().fetch("file:///etc/passwd").await,
            Err(FetchError::UnsupportedReference(_))
        ));
        assert!(matches!(
            source().fetch("not a url").await,
            Err(FetchError::UnsupportedReference(_))
        ));
        assert!(matches!(
            source().fetch("data:image/png;base64,!!!").await,
            Err(FetchError::InlineData(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_order() {
        let refs = vec![png_data_uri(), png_data_uri()];
        let images = fetch_all(&source(), &refs).await.unwrap();
        assert_eq!(images.len(), 2);
    }
}
