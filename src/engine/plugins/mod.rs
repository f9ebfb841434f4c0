//! Meme endpoints shipped with the service

mod delete;
mod maidenless;
mod piccolo;
mod profile;
mod slap;

pub use delete::Delete;
pub use maidenless::Maidenless;
pub use piccolo::Piccolo;
pub use profile::Profile;
pub use slap::Slap;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use crate::registry::{Endpoint, EndpointRegistry, RegistryError};

/// Register every shipped endpoint
pub fn register_all(registry: &mut EndpointRegistry) -> Result<(), RegistryError> {
    registry.register(Endpoint::new("delete", Delete))?;
    registry.register(Endpoint::new("maidenless", Maidenless))?;
    registry.register(Endpoint::new("piccolo", Piccolo))?;
    registry.register(Endpoint::new("profile", Profile).restricted())?;
    registry.register(Endpoint::new("slap", Slap))?;
    Ok(())
}

/// Resize to exact dimensions as RGBA
pub(crate) fn fit(image: &DynamicImage, width: u32, height: u32) -> RgbaImage {
    image.resize_exact(width, height, FilterType::Lanczos3).to_rgba8()
}

/// Alpha-composite `top` onto `base` at `(x, y)`; out-of-bounds parts are clipped
pub(crate) fn paste(base: &mut RgbaImage, top: &RgbaImage, x: i64, y: i64) {
    imageops::overlay(base, top, x, y);
}
