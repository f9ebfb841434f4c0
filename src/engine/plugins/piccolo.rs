use image::{DynamicImage, Rgba};
use rusttype::Scale;

use crate::engine::text::{draw_lines, truncate_chars, wrap};
use crate::engine::{GenerationError, Generator, GeneratorInput, ImageResult};

const BASE: &str = "piccolo/piccolo.bmp";
const FONT: &str = "fonts/medium.ttf";
const MAX_CHARS: usize = 300;

/// Caption written on Piccolo's sign
pub struct Piccolo;

impl Generator for Piccolo {
    fn params(&self) -> &'static [&'static str] {
        &["text"]
    }

    fn generate(&self, input: &GeneratorInput) -> Result<ImageResult, GenerationError> {
        let text = truncate_chars(input.text()?, MAX_CHARS);
        let font = input.assets.font(FONT)?;
        let mut base = input.assets.image(BASE)?.to_rgba8();

        let scale = Scale::uniform(33.0);
        let lines = wrap(&font, scale, text, 850);
        draw_lines(&mut base, &lines, (5, 5), scale, &font, Rgba([0, 0, 0, 255]));

        ImageResult::jpeg(&DynamicImage::ImageRgba8(base), 90)
    }
}
