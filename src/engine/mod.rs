//! Meme generation engine
//!
//! This module contains the image side of the service:
//! - Template asset loading and caching
//! - Avatar retrieval from URLs and inline data
//! - The `Generator` contract and output encoding
//! - The meme plugins themselves

pub mod assets;
pub mod fetch;
pub mod generator;
pub mod plugins;
pub mod text;

pub use assets::{AssetError, AssetProvider};
pub use fetch::{fetch_all, AvatarSource, FetchError, HttpAvatarSource};
pub use generator::{GenerationError, Generator, GeneratorInput, ImageResult, OutputFormat};
