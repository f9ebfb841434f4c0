//! Text layout helpers for caption-style endpoints

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};

/// Greedy word wrap to `max_width` pixels; words wider than a line are split by character
pub fn wrap(font: &Font<'_>, scale: Scale, text: &str, max_width: i32) -> Vec<String> {
    let fits = |candidate: &str| text_size(scale, font, candidate).0 <= max_width;
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();

        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };

            if fits(&candidate) {
                line = candidate;
                continue;
            }

            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }

            if fits(word) {
                line = word.to_string();
                continue;
            }

            for ch in word.chars() {
                line.push(ch);
                if !fits(&line) && line.chars().count() > 1 {
                    line.pop();
                    lines.push(std::mem::take(&mut line));
                    line.push(ch);
                }
            }
        }

        lines.push(line);
    }

    lines
}

/// Height of one rendered line
pub fn line_height(font: &Font<'_>, scale: Scale) -> i32 {
    let metrics = font.v_metrics(scale);
    (metrics.ascent - metrics.descent + metrics.line_gap).ceil() as i32
}

/// Draw pre-wrapped lines top-down starting at `(x, y)`
pub fn draw_lines(
    canvas: &mut RgbaImage,
    lines: &[String],
    origin: (i32, i32),
    scale: Scale,
    font: &Font<'_>,
    color: Rgba<u8>,
) {
    let step = line_height(font, scale);
    let (x, mut y) = origin;

    for line in lines {
        if y >= canvas.height() as i32 {
            break;
        }
        draw_text_mut(canvas, color, x, y, scale, font, line);
        y += step;
    }
}

/// First `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
