use std::path::PathBuf;

use crate::{
    color::Color,
    error::{VidstampError, VidstampResult},
    overlay::OverlaySource,
};

/// Where a point watermark (text or image) is anchored on the surface.
///
/// A tagged union so the compositor's position-resolution branch is
/// exhaustive: either one of the four corners (offset inward by the
/// watermark's padding) or a verbatim pixel coordinate.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Corner(Corner),
    Pixel { x: f32, y: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Edge a bar is attached to. Only horizontal edges exist: percentage
/// thickness is defined against surface height and a left/right bar has no
/// meaningful interpretation, so other edges are unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarEdge {
    Top,
    Bottom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThicknessUnit {
    Px,
    Percent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// Watermark configuration resolved once per recording session.
///
/// Every part is optional; an empty spec composites nothing beyond the
/// pass-through copy of the source frame.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WatermarkSpec {
    pub text: Option<TextWatermark>,
    pub image: Option<ImageWatermark>,
    pub bars: Vec<BarSpec>,
    /// Font file used for text rendering. Falls back to `VIDSTAMP_FONT` and
    /// then to common system font locations when absent.
    pub font: Option<PathBuf>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TextWatermark {
    pub text: String,
    pub position: Position,
    pub font_size: f32,
    pub color: Color,
    /// Inset from the surface edge for corner positions, in pixels.
    pub padding: f32,
}

impl Default for TextWatermark {
    fn default() -> Self {
        Self {
            text: String::new(),
            position: Position::Corner(Corner::BottomRight),
            font_size: 24.0,
            color: Color::white(),
            padding: 10.0,
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ImageWatermark {
    pub source: OverlaySource,
    #[serde(default = "default_image_position")]
    pub position: Position,
    /// Draw width in pixels. When only one of width/height is given the
    /// other is scaled to preserve the bitmap's aspect ratio.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_padding")]
    pub padding: f32,
}

fn default_image_position() -> Position {
    Position::Corner(Corner::BottomRight)
}

fn default_opacity() -> f32 {
    1.0
}

fn default_padding() -> f32 {
    10.0
}

/// Full-width horizontal band at the top or bottom edge, optionally
/// carrying a line of text.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BarSpec {
    pub edge: BarEdge,
    pub thickness: f32,
    pub thickness_unit: ThicknessUnit,
    pub color: Color,
    pub text: Option<String>,
    pub text_color: Color,
    pub text_align: TextAlign,
    pub text_size: f32,
    pub text_padding: f32,
}

impl Default for BarSpec {
    fn default() -> Self {
        Self {
            edge: BarEdge::Bottom,
            thickness: 40.0,
            thickness_unit: ThicknessUnit::Px,
            color: Color::black(),
            text: None,
            text_color: Color::white(),
            text_align: TextAlign::Center,
            text_size: 16.0,
            text_padding: 10.0,
        }
    }
}

impl WatermarkSpec {
    /// True when the spec configures text anywhere (point text or bar text),
    /// i.e. a font will be needed to composite it.
    pub fn wants_text(&self) -> bool {
        self.text.as_ref().is_some_and(|t| !t.text.is_empty())
            || self
                .bars
                .iter()
                .any(|b| b.text.as_ref().is_some_and(|t| !t.is_empty()))
    }

    pub fn validate(&self) -> VidstampResult<()> {
        if let Some(text) = &self.text {
            if !(text.font_size.is_finite() && text.font_size > 0.0) {
                return Err(VidstampError::validation(
                    "text watermark font_size must be finite and > 0",
                ));
            }
        }

        if let Some(image) = &self.image {
            if !(image.opacity.is_finite() && (0.0..=1.0).contains(&image.opacity)) {
                return Err(VidstampError::validation(
                    "image watermark opacity must be within [0, 1]",
                ));
            }
            if image.width == Some(0) || image.height == Some(0) {
                return Err(VidstampError::validation(
                    "image watermark width/height must be > 0 when given",
                ));
            }
        }

        for (idx, bar) in self.bars.iter().enumerate() {
            if !(bar.thickness.is_finite() && bar.thickness >= 0.0) {
                return Err(VidstampError::validation(format!(
                    "bar {idx} thickness must be finite and >= 0"
                )));
            }
            if !(bar.text_size.is_finite() && bar.text_size > 0.0) {
                return Err(VidstampError::validation(format!(
                    "bar {idx} text_size must be finite and > 0"
                )));
            }
            if !(bar.text_padding.is_finite() && bar.text_padding >= 0.0) {
                return Err(VidstampError::validation(format!(
                    "bar {idx} text_padding must be finite and >= 0"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_spec() -> WatermarkSpec {
        WatermarkSpec {
            text: Some(TextWatermark {
                text: "demo".to_string(),
                position: Position::Corner(Corner::BottomRight),
                font_size: 24.0,
                color: Color::white(),
                padding: 12.0,
            }),
            image: Some(ImageWatermark {
                source: OverlaySource::Remote("logo.png".to_string()),
                position: Position::Pixel { x: 4.0, y: 6.0 },
                width: Some(100),
                height: None,
                opacity: 0.8,
                padding: 10.0,
            }),
            bars: vec![BarSpec {
                edge: BarEdge::Top,
                thickness: 10.0,
                thickness_unit: ThicknessUnit::Percent,
                text: Some("title".to_string()),
                ..BarSpec::default()
            }],
            font: None,
        }
    }

    #[test]
    fn empty_spec_is_valid_and_wants_no_text() {
        let spec = WatermarkSpec::default();
        spec.validate().unwrap();
        assert!(!spec.wants_text());
    }

    #[test]
    fn json_roundtrip() {
        let spec = full_spec();
        let s = serde_json::to_string_pretty(&spec).unwrap();
        let de: WatermarkSpec = serde_json::from_str(&s).unwrap();
        assert_eq!(de.bars.len(), 1);
        assert_eq!(de.text.unwrap().padding, 12.0);
        assert_eq!(de.image.unwrap().width, Some(100));
    }

    #[test]
    fn bar_text_alone_wants_text() {
        let mut spec = WatermarkSpec::default();
        spec.bars.push(BarSpec {
            text: Some("hello".to_string()),
            ..BarSpec::default()
        });
        assert!(spec.wants_text());
    }

    #[test]
    fn validate_rejects_out_of_range_opacity() {
        let mut spec = full_spec();
        spec.image.as_mut().unwrap().opacity = 1.5;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_thickness() {
        let mut spec = full_spec();
        spec.bars[0].thickness = -1.0;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_image_dimensions() {
        let mut spec = full_spec();
        spec.image.as_mut().unwrap().width = Some(0);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn zero_thickness_bar_is_valid() {
        let mut spec = WatermarkSpec::default();
        spec.bars.push(BarSpec {
            thickness: 0.0,
            ..BarSpec::default()
        });
        spec.validate().unwrap();
    }
}
