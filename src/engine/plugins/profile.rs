use image::{DynamicImage, Rgba, RgbaImage};
use rusttype::Scale;

use super::{fit, paste};
use crate::engine::text::{draw_lines, truncate_chars, wrap};
use crate::engine::{GenerationError, Generator, GeneratorInput, ImageResult};

const FONT: &str = "fonts/medium.ttf";
const MAX_BIO_CHARS: usize = 200;

/// Profile card: avatar, username and a short bio
pub struct Profile;

impl Generator for Profile {
    fn params(&self) -> &'static [&'static str] {
        &["avatar0", "username0", "text"]
    }

    fn generate(&self, input: &GeneratorInput) -> Result<ImageResult, GenerationError> {
        let avatar = fit(input.avatar(0)?, 200, 200);
        let username = input.username(0)?;
        let bio = truncate_chars(input.text.trim(), MAX_BIO_CHARS);
        let font = input.assets.font(FONT)?;

        let background = input
            .kwargs
            .get("color")
            .map(|hex| parse_hex_color(hex.as_str()))
            .transpose()?
            .unwrap_or(Rgba([35, 39, 42, 255]));

        let mut card = RgbaImage::from_pixel(800, 250, background);
        paste(&mut card, &avatar, 25, 25);

        let white = Rgba([255, 255, 255, 255]);
        let name_scale = Scale::uniform(48.0);
        draw_lines(&mut card, &[username.to_string()], (250, 25), name_scale, &font, white);

        let bio_scale = Scale::uniform(28.0);
        let lines = wrap(&font, bio_scale, bio, 520);
        draw_lines(&mut card, &lines, (250, 95), bio_scale, &font, white);

        ImageResult::png(&DynamicImage::ImageRgba8(card))
    }
}

/// `#rrggbb` or `rrggbb`
fn parse_hex_color(value: &str) -> Result<Rgba<u8>, GenerationError> {
    let hex = value.trim().trim_start_matches('#');
    let invalid = || GenerationError::InvalidInput(format!("Invalid color: {}", value));

    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
    };

    Ok(Rgba([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255]))
}
