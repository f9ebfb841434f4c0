use image::{Delay, Frame, Rgba, RgbaImage};

use super::{fit, paste};
use crate::engine::{GenerationError, Generator, GeneratorInput, ImageResult};

const HAND: &str = "petpet/hand.png";
const FRAMES: u32 = 5;
const WIDTH: u32 = 300;
const HEIGHT: u32 = 200;

/// Animated slap: avatar1 swings the hand into avatar0
pub struct Slap;

impl Generator for Slap {
    fn params(&self) -> &'static [&'static str] {
        &["avatar0", "avatar1"]
    }

    fn generate(&self, input: &GeneratorInput) -> Result<ImageResult, GenerationError> {
        let target = fit(input.avatar(0)?, 120, 120);
        let slapper = fit(input.avatar(1)?, 80, 80);
        let hand = fit(&*input.assets.image(HAND)?, 110, 110);

        let mut frames = Vec::with_capacity(FRAMES as usize);
        for index in 0..FRAMES {
            let mut canvas = RgbaImage::from_pixel(WIDTH, HEIGHT, Rgba([255, 255, 255, 255]));

            // The target recoils once the hand connects
            let recoil = if index + 1 == FRAMES { 15 } else { 0 };
            paste(&mut canvas, &target, 165 + recoil, 40);

            let swing = i64::from(index) * 30;
            paste(&mut canvas, &slapper, 5, 60);
            paste(&mut canvas, &hand, 40 + swing, 45);

            frames.push(Frame::from_parts(
                canvas,
                0,
                0,
                Delay::from_numer_denom_ms(70, 1),
            ));
        }

        ImageResult::gif(frames)
    }
}
