//! Annotated raster surface.
//!
//! `OverlaySurface` holds the current frame and the per-detection
//! annotations drawn over it: a bounding box plus a label strip, in either
//! the normal or the alert color. The surface can encode itself to PNG for
//! the remote dispatcher and is cleared when detection stops.
//!
//! Label text needs a TTF font. The font is loaded once from a configured
//! path; when it is missing the surface still draws boxes and label strips,
//! just without glyphs.

use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::BoundingBox;
use crate::frame::RawFrame;

const BOX_THICKNESS: u32 = 3;
const LABEL_STRIP_HEIGHT: u32 = 20;
const LABEL_FONT_SIZE: f32 = 16.0;
/// Rough per-character advance used to size the label strip.
const LABEL_CHAR_WIDTH: f32 = 9.0;
const LABEL_TEXT_PADDING: i32 = 2;

const NORMAL_RGB: [u8; 3] = [0, 160, 0];
const ALERT_RGB: [u8; 3] = [220, 40, 40];
const TEXT_RGB: [u8; 3] = [255, 255, 255];

/// Overlay color chosen per detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayColor {
    Normal,
    Alert,
}

impl OverlayColor {
    pub fn rgb(self) -> [u8; 3] {
        match self {
            OverlayColor::Normal => NORMAL_RGB,
            OverlayColor::Alert => ALERT_RGB,
        }
    }
}

pub struct OverlaySurface {
    image: Option<RgbImage>,
    font: Option<FontArc>,
}

impl OverlaySurface {
    /// Surface without label glyphs.
    pub fn new() -> Self {
        Self {
            image: None,
            font: None,
        }
    }

    /// Surface with label text rendered from a TTF file. A missing or
    /// unreadable font degrades to boxes without glyphs.
    pub fn with_font_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let font = match std::fs::read(path) {
            Ok(bytes) => match FontArc::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(err) => {
                    log::warn!(
                        "overlay font {} unusable, labels drawn without text: {}",
                        path.display(),
                        err
                    );
                    None
                }
            },
            Err(err) => {
                log::warn!(
                    "overlay font {} unreadable, labels drawn without text: {}",
                    path.display(),
                    err
                );
                None
            }
        };
        Self { image: None, font }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Replace the surface contents with a fresh frame, dropping previous
    /// annotations.
    pub fn reset_to(&mut self, frame: &RawFrame) -> Result<()> {
        let image = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame pixel buffer did not match its dimensions"))?;
        self.image = Some(image);
        Ok(())
    }

    /// Draw a detection box plus its label strip in the given color.
    ///
    /// Boxes partially outside the frame are clamped; degenerate boxes are
    /// skipped.
    pub fn draw_detection(&mut self, bbox: &BoundingBox, label: &str, color: OverlayColor) {
        let Some(image) = self.image.as_mut() else {
            return;
        };
        let (img_w, img_h) = (image.width() as i64, image.height() as i64);

        let x0 = (bbox.x as i64).clamp(0, img_w - 1);
        let y0 = (bbox.y as i64).clamp(0, img_h - 1);
        let x1 = ((bbox.x + bbox.width) as i64).clamp(0, img_w - 1);
        let y1 = ((bbox.y + bbox.height) as i64).clamp(0, img_h - 1);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let rgb = Rgb(color.rgb());
        for inset in 0..BOX_THICKNESS as i64 {
            let left = x0 + inset;
            let top = y0 + inset;
            let width = x1 - x0 - 2 * inset;
            let height = y1 - y0 - 2 * inset;
            if width <= 0 || height <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                image,
                Rect::at(left as i32, top as i32).of_size(width as u32, height as u32),
                rgb,
            );
        }

        // Label strip sits just above the box, like the box itself clamped
        // to the frame.
        let strip_w =
            ((label.len() as f32 * LABEL_CHAR_WIDTH) as i64 + 10).clamp(1, img_w - x0) as u32;
        let strip_y = (y0 - LABEL_STRIP_HEIGHT as i64).max(0);
        draw_filled_rect_mut(
            image,
            Rect::at(x0 as i32, strip_y as i32).of_size(strip_w, LABEL_STRIP_HEIGHT),
            rgb,
        );

        if let Some(font) = &self.font {
            draw_text_mut(
                image,
                Rgb(TEXT_RGB),
                x0 as i32 + 5,
                strip_y as i32 + LABEL_TEXT_PADDING,
                PxScale::from(LABEL_FONT_SIZE),
                font,
                label,
            );
        }
    }

    /// Encode the current surface (frame plus annotations) as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| anyhow!("overlay surface is empty"))?;
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("encode overlay snapshot as png")?;
        Ok(bytes)
    }

    /// Drop the surface contents. Called on the Running -> Idle transition.
    pub fn clear(&mut self) {
        self.image = None;
    }

    pub fn is_clear(&self) -> bool {
        self.image.is_none()
    }

    /// Read one pixel back, for inspection in tests.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let image = self.image.as_ref()?;
        if x >= image.width() || y >= image.height() {
            return None;
        }
        Some(image.get_pixel(x, y).0)
    }
}

impl Default for OverlaySurface {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32) -> RawFrame {
        RawFrame::new(vec![128u8; (width * height * 3) as usize], width, height).unwrap()
    }

    #[test]
    fn reset_fills_surface_with_frame() -> Result<()> {
        let mut surface = OverlaySurface::new();
        assert!(surface.is_clear());

        surface.reset_to(&gray_frame(32, 24))?;
        assert!(!surface.is_clear());
        assert_eq!(surface.pixel(10, 10), Some([128, 128, 128]));
        Ok(())
    }

    #[test]
    fn draws_box_border_in_requested_color() -> Result<()> {
        let mut surface = OverlaySurface::new();
        surface.reset_to(&gray_frame(64, 64))?;

        let bbox = BoundingBox::new(10.0, 30.0, 20.0, 20.0);
        surface.draw_detection(&bbox, "person - 1.00m", OverlayColor::Alert);

        assert_eq!(surface.pixel(10, 30), Some(OverlayColor::Alert.rgb()));
        // Interior stays untouched.
        assert_eq!(surface.pixel(20, 40), Some([128, 128, 128]));
        Ok(())
    }

    #[test]
    fn normal_and_alert_colors_differ() {
        assert_ne!(OverlayColor::Normal.rgb(), OverlayColor::Alert.rgb());
    }

    #[test]
    fn degenerate_boxes_are_skipped() -> Result<()> {
        let mut surface = OverlaySurface::new();
        surface.reset_to(&gray_frame(32, 32))?;
        surface.draw_detection(
            &BoundingBox::new(5.0, 5.0, 0.0, 0.0),
            "person",
            OverlayColor::Normal,
        );
        assert_eq!(surface.pixel(5, 5), Some([128, 128, 128]));
        Ok(())
    }

    #[test]
    fn encode_png_round_trips_dimensions() -> Result<()> {
        let mut surface = OverlaySurface::new();
        surface.reset_to(&gray_frame(16, 8))?;

        let png = surface.encode_png()?;
        let decoded = image::load_from_memory(&png)?;
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 8);
        Ok(())
    }

    #[test]
    fn clear_empties_surface() -> Result<()> {
        let mut surface = OverlaySurface::new();
        surface.reset_to(&gray_frame(8, 8))?;
        surface.clear();
        assert!(surface.is_clear());
        assert!(surface.encode_png().is_err());
        Ok(())
    }

    #[test]
    fn missing_font_degrades_without_text() {
        let surface = OverlaySurface::with_font_path("/nonexistent/font.ttf");
        assert!(!surface.has_font());
    }
}
