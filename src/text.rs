//! Glyph measurement and rasterization for text watermarks.
//!
//! Fonts are resolved at runtime: an explicit path from the watermark spec
//! wins, then the `VIDSTAMP_FONT` environment variable, then a short list of
//! common system font locations. Text width depends on both the font and the
//! size, so callers must measure with the same scale they draw with.

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use tracing::warn;

use crate::{color::Color, frame::FrameRgba};

const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/usr/share/fonts/gnu-free/FreeSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

fn font_from_path(path: &Path) -> Option<FontArc> {
    let bytes = std::fs::read(path).ok()?;
    FontArc::try_from_vec(bytes).ok()
}

/// Resolve a font for text watermarks, or `None` when nothing usable exists.
/// A missing font degrades text rendering, it never blocks recording.
pub fn load_font(explicit: Option<&Path>) -> Option<FontArc> {
    if let Some(path) = explicit {
        match font_from_path(path) {
            Some(font) => return Some(font),
            None => warn!(path = %path.display(), "configured watermark font failed to load"),
        }
    }

    if let Ok(env_path) = std::env::var("VIDSTAMP_FONT") {
        if let Some(font) = font_from_path(Path::new(&env_path)) {
            return Some(font);
        }
        warn!(path = %env_path, "VIDSTAMP_FONT failed to load");
    }

    SYSTEM_FONT_CANDIDATES
        .iter()
        .find_map(|p| font_from_path(Path::new(p)))
}

/// Advance width of a line of text at the given pixel size, kerning included.
pub fn measure_width(font: &FontArc, text: &str, size: f32) -> f32 {
    let scaled = font.as_scaled(PxScale::from(size));
    let mut width = 0.0f32;
    let mut prev: Option<ab_glyph::GlyphId> = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }
    width
}

/// Baseline y that vertically centers a line of text on `center_y`.
pub fn centered_baseline(font: &FontArc, size: f32, center_y: f32) -> f32 {
    let scaled = font.as_scaled(PxScale::from(size));
    // Glyph box spans [baseline - ascent, baseline - descent] (descent < 0).
    center_y + (scaled.ascent() + scaled.descent()) / 2.0
}

/// Rasterize one line of text into the frame with its baseline origin at
/// `(x, baseline_y)`. Coverage is alpha-blended, so anti-aliased edges mix
/// with whatever is already on the frame; off-surface glyphs clip.
pub fn draw_text(
    frame: &mut FrameRgba,
    font: &FontArc,
    text: &str,
    size: f32,
    color: Color,
    x: f32,
    baseline_y: f32,
) {
    let scale = PxScale::from(size);
    let scaled = font.as_scaled(scale);

    let mut cursor_x = x;
    let mut prev: Option<ab_glyph::GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            cursor_x += scaled.kern(prev, id);
        }

        let glyph = id.with_scale_and_position(scale, ab_glyph::point(cursor_x, baseline_y));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = gx as i32 + bounds.min.x as i32;
                let py = gy as i32 + bounds.min.y as i32;
                let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                frame.blend_pixel(px, py, color.rgba8(alpha), 1.0);
            });
        }

        cursor_x += scaled.h_advance(id);
        prev = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Glyph tests need a real font; skip quietly on hosts without one,
    /// the same way encoder tests skip without ffmpeg.
    fn test_font() -> Option<FontArc> {
        load_font(None)
    }

    #[test]
    fn measure_width_scales_with_font_size() {
        let Some(font) = test_font() else {
            eprintln!("skipping: no system font available");
            return;
        };
        let small = measure_width(&font, "Hello", 12.0);
        let large = measure_width(&font, "Hello", 24.0);
        assert!(small > 0.0);
        assert!(large > small);
    }

    #[test]
    fn measure_width_of_empty_text_is_zero() {
        let Some(font) = test_font() else {
            eprintln!("skipping: no system font available");
            return;
        };
        assert_eq!(measure_width(&font, "", 24.0), 0.0);
    }

    #[test]
    fn draw_text_leaves_visible_pixels() {
        let Some(font) = test_font() else {
            eprintln!("skipping: no system font available");
            return;
        };
        let mut frame = FrameRgba::filled(120, 40, [0, 0, 0, 255]);
        draw_text(&mut frame, &font, "Hi", 24.0, Color::white(), 4.0, 30.0);
        assert!(frame.data.chunks_exact(4).any(|px| px[0] > 128));
    }

    #[test]
    fn draw_text_clips_off_surface() {
        let Some(font) = test_font() else {
            eprintln!("skipping: no system font available");
            return;
        };
        let mut frame = FrameRgba::filled(20, 20, [0, 0, 0, 255]);
        let before = frame.clone();
        draw_text(&mut frame, &font, "Hi", 24.0, Color::white(), 500.0, 500.0);
        assert_eq!(frame, before);
    }

    #[test]
    fn centered_baseline_sits_below_center() {
        let Some(font) = test_font() else {
            eprintln!("skipping: no system font available");
            return;
        };
        let baseline = centered_baseline(&font, 20.0, 50.0);
        assert!(baseline > 50.0);
        assert!(baseline < 70.0);
    }

    #[test]
    fn load_font_with_bad_explicit_path_falls_back() {
        // Must not panic; either finds a system font or returns None.
        let _ = load_font(Some(Path::new("/nonexistent/font.ttf")));
    }
}
