use image::{DynamicImage, Rgba};
use rusttype::Scale;

use crate::engine::text::{draw_lines, wrap};
use crate::engine::{GenerationError, Generator, GeneratorInput, ImageResult};

const BASE: &str = "maidenless/noBitches.png";
const FONT: &str = "fonts/impact.ttf";

/// White Impact caption over the "maidenless" template
pub struct Maidenless;

impl Generator for Maidenless {
    fn params(&self) -> &'static [&'static str] {
        &["text"]
    }

    fn generate(&self, input: &GeneratorInput) -> Result<ImageResult, GenerationError> {
        let text = input.text()?;
        let font = input.assets.font(FONT)?;
        let mut base = input.assets.image(BASE)?.to_rgba8();

        let scale = Scale::uniform(50.0);
        let lines = wrap(&font, scale, text, 220);
        draw_lines(&mut base, &lines, (155, 7), scale, &font, Rgba([255, 255, 255, 255]));

        ImageResult::jpeg(&DynamicImage::ImageRgba8(base), 90)
    }
}
