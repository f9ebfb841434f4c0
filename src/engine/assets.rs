//! Template asset loading and caching

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use parking_lot::RwLock;
use image::{DynamicImage, ImageError};
use rusttype::Font;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Asset-related errors
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Failed to load asset image {path}: {source}")]
    ImageLoad {
        path: String,
        #[source]
        source: ImageError,
    },
    #[error("Failed to read asset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid font file: {0}")]
    InvalidFont(String),
    #[error("Asset loader task failed: {0}")]
    Join(String),
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// Read-only cache of template images and fonts
///
/// Assets are addressed by their path relative to the asset root and loaded
/// on first use. Cached entries are never evicted.
pub struct AssetProvider {
    base_path: PathBuf,
    images: RwLock<HashMap<String, Arc<DynamicImage>>>,
    fonts: RwLock<HashMap<String, Arc<Font<'static>>>>,
}

impl AssetProvider {
    pub fn new(base_path: PathBuf) -> Self {
        AssetProvider {
            base_path,
            images: RwLock::new(HashMap::new()),
            fonts: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a template image, loading it on first use
    pub fn image(&self, relative: &str) -> Result<Arc<DynamicImage>, AssetError> {
        if let Some(image) = self.images.read().get(relative) {
            return Ok(image.clone());
        }

        let path = self.base_path.join(relative);
        let image = image::open(&path).map_err(|source| AssetError::ImageLoad {
            path: path.display().to_string(),
            source,
        })?;
        debug!(asset = %relative, "Loaded template image");

        let image = Arc::new(image);
        self.images
            .write()
            .entry(relative.to_string())
            .or_insert_with(|| image.clone());
        Ok(image)
    }

    /// Fetch a font, loading it on first use
    pub fn font(&self, relative: &str) -> Result<Arc<Font<'static>>, AssetError> {
        if let Some(font) = self.fonts.read().get(relative) {
            return Ok(font.clone());
        }

        let path = self.base_path.join(relative);
        let data = std::fs::read(&path).map_err(|source| AssetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let font = Font::try_from_vec(data)
            .ok_or_else(|| AssetError::InvalidFont(path.display().to_string()))?;
        debug!(asset = %relative, "Loaded font");

        let font = Arc::new(font);
        self.fonts
            .write()
            .entry(relative.to_string())
            .or_insert_with(|| font.clone());
        Ok(font)
    }

    /// Seed an image under `relative` without touching disk
    #[cfg(test)]
    pub fn insert_image(&self, relative: &str, image: DynamicImage) {
        self.images.write().insert(relative.to_string(), Arc::new(image));
    }

    /// Number of cached images
    pub fn image_count(&self) -> usize {
        self.images.read().len()
    }

    /// Load every image under the asset root into the cache
    pub async fn load_all(&self) -> Result<usize, AssetError> {
        let base_path = self.base_path.clone();

        // Spawn blocking task for file I/O
        let loaded = tokio::task::spawn_blocking(move || {
            let mut loaded = HashMap::new();

            if !base_path.exists() {
                warn!("Asset directory does not exist: {}", base_path.display());
                return loaded;
            }

            let mut pending = vec![base_path.clone()];
            while let Some(dir) = pending.pop() {
                let entries = match std::fs::read_dir(&dir) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(path = %dir.display(), error = %e, "Failed to read asset directory");
                        continue;
                    }
                };

                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        pending.push(path);
                    } else if is_image(&path) {
                        match image::open(&path) {
                            Ok(image) => {
                                let relative = relative_key(&base_path, &path);
                                loaded.insert(relative, Arc::new(image));
                            }
                            Err(e) => {
                                warn!(path = %path.display(), error = %e, "Failed to load asset image");
                            }
                        }
                    }
                }
            }

            loaded
        })
        .await
        .map_err(|e| AssetError::Join(e.to_string()))?;

        let count = loaded.len();
        self.images.write().extend(loaded);
        info!(images = count, "Preloaded template assets");
        Ok(count)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Cache key for an asset: its path under the root with `/` separators
fn relative_key(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
