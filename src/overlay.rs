//! Overlay asset loading.
//!
//! Resolves an image watermark source into a ready-to-draw bitmap. Loading
//! happens at most once per recording session; every failure is absorbed
//! into a logged warning because a broken watermark must never block a
//! recording.

use anyhow::Context as _;
use tracing::warn;

use crate::{
    error::{VidstampError, VidstampResult},
    frame::FrameRgba,
    surface::RecordSurface,
};

/// Source of an image watermark.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlaySource {
    /// HTTP(S) URL or local filesystem path to an encoded image.
    Remote(String),
    /// Encoded image bytes already in memory (PNG, JPEG, ...).
    Encoded(Vec<u8>),
    /// Raw straight-alpha RGBA8 snapshot of an existing surface.
    Raster {
        width: u32,
        height: u32,
        rgba8: Vec<u8>,
    },
}

impl OverlaySource {
    /// Snapshot the current pixels of a surface.
    pub fn from_surface(surface: &dyn RecordSurface) -> Self {
        let (width, height) = surface.dimensions();
        let mut frame = FrameRgba::new(width, height);
        surface.read_into(&mut frame);
        Self::Raster {
            width,
            height,
            rgba8: frame.data,
        }
    }
}

/// Decoded overlay bitmap, straight-alpha RGBA8.
#[derive(Clone, Debug)]
pub struct PreparedOverlay {
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

impl PreparedOverlay {
    /// Resample to the given draw size (no-op when it already matches).
    pub fn scaled(&self, width: u32, height: u32) -> PreparedOverlay {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let Some(img) = image::RgbaImage::from_raw(self.width, self.height, self.rgba8.clone())
        else {
            // Buffer/dimension mismatch; drawing verbatim clips safely.
            return self.clone();
        };
        let resized =
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle);
        PreparedOverlay {
            width,
            height,
            rgba8: resized.into_raw(),
        }
    }
}

/// Resolve an overlay source, absorbing failures.
///
/// Returns `None` (with a single warning) when the source cannot be fetched
/// or decoded; the compositor then skips the image step.
pub fn load_overlay(source: &OverlaySource) -> Option<PreparedOverlay> {
    match try_load(source) {
        Ok(overlay) => Some(overlay),
        Err(err) => {
            warn!(error = %err, "watermark image unavailable, recording without it");
            None
        }
    }
}

fn try_load(source: &OverlaySource) -> VidstampResult<PreparedOverlay> {
    match source {
        OverlaySource::Remote(location) => {
            let bytes = fetch_bytes(location)?;
            decode_image(&bytes)
        }
        OverlaySource::Encoded(bytes) => decode_image(bytes),
        OverlaySource::Raster {
            width,
            height,
            rgba8,
        } => {
            let expected = (*width as usize) * (*height as usize) * 4;
            if rgba8.len() != expected {
                return Err(VidstampError::validation(format!(
                    "raster overlay has {} bytes, expected {expected} for {width}x{height}",
                    rgba8.len()
                )));
            }
            Ok(PreparedOverlay {
                width: *width,
                height: *height,
                rgba8: rgba8.clone(),
            })
        }
    }
}

fn fetch_bytes(location: &str) -> VidstampResult<Vec<u8>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let response = reqwest::blocking::get(location)
            .with_context(|| format!("fetch watermark image '{location}'"))?
            .error_for_status()
            .with_context(|| format!("fetch watermark image '{location}'"))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("read watermark image body '{location}'"))?;
        Ok(bytes.to_vec())
    } else {
        let bytes = std::fs::read(location)
            .with_context(|| format!("read watermark image file '{location}'"))?;
        Ok(bytes)
    }
}

fn decode_image(bytes: &[u8]) -> VidstampResult<PreparedOverlay> {
    let dyn_img = image::load_from_memory(bytes).context("decode watermark image")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(PreparedOverlay {
        width,
        height,
        rgba8: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn png_bytes(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn encoded_source_decodes() {
        let overlay = load_overlay(&OverlaySource::Encoded(png_bytes(3, 2, [10, 20, 30, 255])))
            .expect("decodes");
        assert_eq!((overlay.width, overlay.height), (3, 2));
        assert_eq!(&overlay.rgba8[0..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn raster_source_is_used_verbatim() {
        let overlay = load_overlay(&OverlaySource::Raster {
            width: 2,
            height: 1,
            rgba8: vec![1, 2, 3, 4, 5, 6, 7, 8],
        })
        .expect("raster passes through");
        assert_eq!(overlay.rgba8, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn raster_with_wrong_length_soft_fails() {
        assert!(load_overlay(&OverlaySource::Raster {
            width: 2,
            height: 2,
            rgba8: vec![0; 3],
        })
        .is_none());
    }

    #[test]
    fn missing_file_soft_fails() {
        assert!(load_overlay(&OverlaySource::Remote(
            "/definitely/not/here.png".to_string()
        ))
        .is_none());
    }

    #[test]
    fn unreachable_url_soft_fails() {
        // Port 1 refuses connections; no external network involved.
        assert!(load_overlay(&OverlaySource::Remote(
            "http://127.0.0.1:1/logo.png".to_string()
        ))
        .is_none());
    }

    #[test]
    fn garbage_bytes_soft_fail() {
        assert!(load_overlay(&OverlaySource::Encoded(vec![0xde, 0xad, 0xbe, 0xef])).is_none());
    }

    #[test]
    fn scaled_resamples_to_requested_size() {
        let overlay = PreparedOverlay {
            width: 4,
            height: 2,
            rgba8: vec![200; 4 * 2 * 4],
        };
        let scaled = overlay.scaled(2, 1);
        assert_eq!((scaled.width, scaled.height), (2, 1));
        assert_eq!(scaled.rgba8.len(), 8);
    }
}
