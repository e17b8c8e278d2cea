//! Raw camera frames.
//!
//! `RawFrame` is the unit of exchange between the camera source, the
//! detector backend, and the overlay surface: tightly packed RGB8 pixels
//! plus dimensions. Frames are produced fresh by the source each iteration
//! and dropped after the frame's draw/alert pass; nothing in the pipeline
//! retains them.

use anyhow::{anyhow, Result};

/// A single captured frame (tightly packed RGB8).
#[derive(Clone, Debug)]
pub struct RawFrame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl RawFrame {
    /// Wrap pixel data in a frame, checking the RGB8 length invariant.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}
