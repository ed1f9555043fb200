//! Per-frame watermark compositing.
//!
//! [`composite`] layers the source frame plus bars, text, and image overlays
//! onto the target in a fixed z-order. Bars are full-width backgrounds and
//! render first so point watermarks stack above them; text-before-image is
//! the fixed convention callers can rely on. The function is pure rendering:
//! no state, no allocation beyond a scaled overlay when the draw size
//! differs from the bitmap, and no failure modes for valid geometry
//! (out-of-range coordinates clip in the drawing primitives).

use ab_glyph::FontArc;

use crate::{
    frame::FrameRgba,
    overlay::PreparedOverlay,
    position::{box_anchor, text_anchor},
    spec::{BarEdge, BarSpec, TextAlign, ThicknessUnit, WatermarkSpec},
    text::{centered_baseline, draw_text, measure_width},
};

/// Bar thickness in pixels. Percent is measured against surface height.
pub fn bar_thickness_px(thickness: f32, unit: ThicknessUnit, surface_height: u32) -> f32 {
    match unit {
        ThicknessUnit::Px => thickness,
        ThicknessUnit::Percent => thickness / 100.0 * surface_height as f32,
    }
}

/// Draw size for an image watermark.
///
/// Both dimensions given: verbatim. One given: the other preserves the
/// bitmap's aspect ratio. Neither: the natural bitmap size.
pub fn overlay_draw_size(
    natural_width: u32,
    natural_height: u32,
    want_width: Option<u32>,
    want_height: Option<u32>,
) -> (u32, u32) {
    match (want_width, want_height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => {
            let h = (w as f64 * natural_height as f64 / natural_width as f64).round() as u32;
            (w, h.max(1))
        }
        (None, Some(h)) => {
            let w = (h as f64 * natural_width as f64 / natural_height as f64).round() as u32;
            (w.max(1), h)
        }
        (None, None) => (natural_width, natural_height),
    }
}

/// Composite one frame: overwrite `target` with `source`, then layer the
/// watermarks described by `spec` on top.
///
/// The overwrite guarantees stale overlay pixels from the previous frame
/// never bleed through, which also makes the pass idempotent for identical
/// source content. Text steps are skipped when no font resolved; the image
/// step is skipped when the overlay failed to load.
pub fn composite(
    source: &FrameRgba,
    target: &mut FrameRgba,
    spec: &WatermarkSpec,
    overlay: Option<&PreparedOverlay>,
    font: Option<&FontArc>,
) {
    target.copy_from(source);

    for bar in &spec.bars {
        draw_bar(target, bar, font);
    }

    if let Some(text) = &spec.text {
        if !text.text.is_empty() {
            if let Some(font) = font {
                let width = measure_width(font, &text.text, text.font_size);
                let (x, baseline) = text_anchor(
                    text.position,
                    width,
                    text.font_size,
                    target.width,
                    target.height,
                    text.padding,
                );
                draw_text(
                    target, font, &text.text, text.font_size, text.color, x, baseline,
                );
            }
        }
    }

    if let (Some(image), Some(overlay)) = (&spec.image, overlay) {
        let (draw_w, draw_h) =
            overlay_draw_size(overlay.width, overlay.height, image.width, image.height);
        let (x, y) = box_anchor(
            image.position,
            draw_w,
            draw_h,
            target.width,
            target.height,
            image.padding,
        );
        if (draw_w, draw_h) == (overlay.width, overlay.height) {
            target.blend_image(&overlay.rgba8, draw_w, draw_h, x, y, image.opacity);
        } else {
            let scaled = overlay.scaled(draw_w, draw_h);
            target.blend_image(&scaled.rgba8, draw_w, draw_h, x, y, image.opacity);
        }
    }
}

fn draw_bar(target: &mut FrameRgba, bar: &BarSpec, font: Option<&FontArc>) {
    let thickness = bar_thickness_px(bar.thickness, bar.thickness_unit, target.height);
    let thickness_px = thickness.round().max(0.0) as u32;
    let bar_top = match bar.edge {
        BarEdge::Top => 0i32,
        BarEdge::Bottom => target.height as i32 - thickness_px as i32,
    };
    target.fill_rect(0, bar_top, target.width, thickness_px, bar.color.rgba8(255));

    let Some(text) = bar.text.as_deref().filter(|t| !t.is_empty()) else {
        return;
    };
    let Some(font) = font else {
        return;
    };

    let text_width = measure_width(font, text, bar.text_size);
    let x = match bar.text_align {
        TextAlign::Left => bar.text_padding,
        TextAlign::Center => (target.width as f32 - text_width) / 2.0,
        TextAlign::Right => target.width as f32 - text_width - bar.text_padding,
    };
    let center_y = bar_top as f32 + thickness / 2.0;
    let baseline = centered_baseline(font, bar.text_size, center_y);
    draw_text(target, font, text, bar.text_size, bar.text_color, x, baseline);
}
