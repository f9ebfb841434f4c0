use image::DynamicImage;

use super::{fit, paste};
use crate::engine::{GenerationError, Generator, GeneratorInput, ImageResult};

const BASE: &str = "delete/delete.bmp";

/// Avatar dropped into a "delete this file?" dialog
pub struct Delete;

impl Generator for Delete {
    fn params(&self) -> &'static [&'static str] {
        &["avatar0"]
    }

    fn generate(&self, input: &GeneratorInput) -> Result<ImageResult, GenerationError> {
        let avatar = fit(input.avatar(0)?, 195, 195);
        let mut base = input.assets.image(BASE)?.to_rgba8();

        paste(&mut base, &avatar, 120, 135);

        ImageResult::png(&DynamicImage::ImageRgba8(base))
    }
}
