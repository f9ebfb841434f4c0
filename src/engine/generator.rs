//! The generator contract shared by every meme endpoint

use bytes::Bytes;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{DynamicImage, Frame, ImageError, ImageOutputFormat};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

use super::assets::{AssetError, AssetProvider};

/// Generation errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Internal(String),
}

impl From<AssetError> for GenerationError {
    fn from(err: AssetError) -> Self {
        GenerationError::Internal(err.to_string())
    }
}

impl From<ImageError> for GenerationError {
    fn from(err: ImageError) -> Self {
        GenerationError::Internal(format!("Image processing failed: {}", err))
    }
}

/// Encoded output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Gif,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Gif => "image/gif",
        }
    }
}

/// An encoded image ready to be sent
#[derive(Debug, Clone)]
pub struct ImageResult {
    pub bytes: Bytes,
    pub format: OutputFormat,
}

impl ImageResult {
    /// Encode to PNG (preserves RGBA transparency)
    pub fn png(image: &DynamicImage) -> Result<Self, GenerationError> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageOutputFormat::Png)?;
        Ok(Self {
            bytes: Bytes::from(buffer.into_inner()),
            format: OutputFormat::Png,
        })
    }

    /// Encode to JPEG; alpha is dropped
    pub fn jpeg(image: &DynamicImage, quality: u8) -> Result<Self, GenerationError> {
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut buffer = Cursor::new(Vec::new());
        rgb.write_to(&mut buffer, ImageOutputFormat::Jpeg(quality))?;
        Ok(Self {
            bytes: Bytes::from(buffer.into_inner()),
            format: OutputFormat::Jpeg,
        })
    }

    /// Encode frames as an endlessly looping GIF
    pub fn gif(frames: Vec<Frame>) -> Result<Self, GenerationError> {
        if frames.is_empty() {
            return Err(GenerationError::Internal("No frames to encode".to_string()));
        }

        let mut buffer = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buffer);
            encoder.set_repeat(Repeat::Infinite)?;
            encoder.encode_frames(frames)?;
        }
        Ok(Self {
            bytes: Bytes::from(buffer),
            format: OutputFormat::Gif,
        })
    }
}

/// Everything a generator may read for one request
pub struct GeneratorInput {
    pub text: String,
    /// Decoded avatars, in request order
    pub avatars: Vec<DynamicImage>,
    pub usernames: Vec<String>,
    pub kwargs: BTreeMap<String, String>,
    pub assets: Arc<AssetProvider>,
}

impl GeneratorInput {
    pub fn avatar(&self, index: usize) -> Result<&DynamicImage, GenerationError> {
        self.avatars
            .get(index)
            .ok_or_else(|| GenerationError::MissingParameter(format!("avatar{}", index)))
    }

    pub fn username(&self, index: usize) -> Result<&str, GenerationError> {
        self.usernames
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| GenerationError::MissingParameter(format!("username{}", index)))
    }

    /// Non-empty text, or a missing-parameter error
    pub fn text(&self) -> Result<&str, GenerationError> {
        let text = self.text.trim();
        if text.is_empty() {
            Err(GenerationError::MissingParameter("text".to_string()))
        } else {
            Ok(text)
        }
    }
}

/// A meme endpoint's compositing logic
///
/// Implementations are synchronous and CPU-bound; the dispatcher runs them on
/// the blocking pool. Decoded buffers are owned locally and dropped on every
/// exit path.
pub trait Generator: Send + Sync {
    /// Parameter names the endpoint requires, e.g. `["avatar0", "avatar1"]`
    fn params(&self) -> &'static [&'static str];

    fn generate(&self, input: &GeneratorInput) -> Result<ImageResult, GenerationError>;

    /// Number of avatar slots this generator consumes
    fn avatar_slots(&self) -> usize {
        self.params()
            .iter()
            .filter(|param| param.starts_with("avatar"))
            .count()
    }
}
