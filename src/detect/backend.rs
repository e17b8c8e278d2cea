use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::RawFrame;

/// Detector backend trait.
///
/// Implementations wrap a pretrained general-object detector. A backend is
/// warmed up once when a detection session starts and then invoked once per
/// frame; it must treat the frame as read-only and must not retain it
/// beyond the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// One-time model load / buffer allocation, performed before the first
    /// frame. Must be idempotent: sessions are restartable and call this on
    /// every start.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Run detection on a frame, returning zero or more detections with
    /// pixel-coordinate bounding boxes.
    fn detect(&mut self, frame: &RawFrame) -> Result<Vec<Detection>>;
}
