//! Placement math for point watermarks.
//!
//! Text anchors at the glyph baseline, so corner resolution folds the font
//! size into the vertical offset; images anchor at the top-left of their
//! draw box. Pixel positions are always used verbatim.

use crate::spec::{Corner, Position};

/// Baseline origin for a text watermark.
///
/// Corner rules: the text's right edge sits `padding` pixels inside a right
/// corner, the baseline sits `padding` pixels above a bottom edge, and
/// `padding + font_size` below a top edge.
pub fn text_anchor(
    position: Position,
    text_width: f32,
    font_size: f32,
    surface_width: u32,
    surface_height: u32,
    padding: f32,
) -> (f32, f32) {
    let w = surface_width as f32;
    let h = surface_height as f32;
    match position {
        Position::Pixel { x, y } => (x, y),
        Position::Corner(Corner::TopLeft) => (padding, padding + font_size),
        Position::Corner(Corner::TopRight) => (w - text_width - padding, padding + font_size),
        Position::Corner(Corner::BottomLeft) => (padding, h - padding),
        Position::Corner(Corner::BottomRight) => (w - text_width - padding, h - padding),
    }
}

/// Top-left origin for a boxed watermark (image) of the given draw size.
pub fn box_anchor(
    position: Position,
    box_width: u32,
    box_height: u32,
    surface_width: u32,
    surface_height: u32,
    padding: f32,
) -> (i32, i32) {
    let w = surface_width as i32;
    let h = surface_height as i32;
    let bw = box_width as i32;
    let bh = box_height as i32;
    let m = padding.round() as i32;
    match position {
        Position::Pixel { x, y } => (x.round() as i32, y.round() as i32),
        Position::Corner(Corner::TopLeft) => (m, m),
        Position::Corner(Corner::TopRight) => (w - bw - m, m),
        Position::Corner(Corner::BottomLeft) => (m, h - bh - m),
        Position::Corner(Corner::BottomRight) => (w - bw - m, h - bh - m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 640;
    const H: u32 = 480;

    #[test]
    fn text_corners_inset_by_padding() {
        let tw = 120.0;
        let fs = 24.0;
        let pad = 10.0;

        assert_eq!(
            text_anchor(Position::Corner(Corner::TopLeft), tw, fs, W, H, pad),
            (10.0, 34.0)
        );
        assert_eq!(
            text_anchor(Position::Corner(Corner::TopRight), tw, fs, W, H, pad),
            (640.0 - 120.0 - 10.0, 34.0)
        );
        assert_eq!(
            text_anchor(Position::Corner(Corner::BottomLeft), tw, fs, W, H, pad),
            (10.0, 470.0)
        );
        assert_eq!(
            text_anchor(Position::Corner(Corner::BottomRight), tw, fs, W, H, pad),
            (640.0 - 120.0 - 10.0, 470.0)
        );
    }

    #[test]
    fn text_pixel_position_is_verbatim() {
        assert_eq!(
            text_anchor(Position::Pixel { x: 33.0, y: 44.0 }, 120.0, 24.0, W, H, 10.0),
            (33.0, 44.0)
        );
    }

    #[test]
    fn box_corners_inset_by_padding() {
        assert_eq!(
            box_anchor(Position::Corner(Corner::TopLeft), 100, 50, W, H, 10.0),
            (10, 10)
        );
        assert_eq!(
            box_anchor(Position::Corner(Corner::BottomRight), 100, 50, W, H, 10.0),
            (530, 420)
        );
        assert_eq!(
            box_anchor(Position::Corner(Corner::TopRight), 100, 50, W, H, 10.0),
            (530, 10)
        );
        assert_eq!(
            box_anchor(Position::Corner(Corner::BottomLeft), 100, 50, W, H, 10.0),
            (10, 420)
        );
    }

    #[test]
    fn oversized_box_may_go_negative() {
        // Clipping is the drawing primitive's job, not the anchor's.
        let (x, y) = box_anchor(Position::Corner(Corner::TopRight), 800, 600, W, H, 10.0);
        assert_eq!((x, y), (-170, 10));
    }
}
