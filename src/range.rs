//! Known-width range estimation.
//!
//! Distance is estimated with the pinhole-projection relation
//! `distance = known_width * focal_length / pixel_width`, assuming a fixed
//! real-world width per object class and a fixed, uncalibrated focal
//! length. Labels without a known width cannot be ranged and therefore can
//! never trip the proximity warning; a non-positive pixel width is treated
//! the same way rather than dividing by zero.

use std::collections::HashMap;

/// Assumed focal length in pixels when none is configured.
pub const DEFAULT_FOCAL_LENGTH_PX: f64 = 800.0;

/// Assumed real-world widths in meters, by class label.
pub const DEFAULT_KNOWN_WIDTHS_M: [(&str, f64); 5] = [
    ("person", 0.5),
    ("car", 1.8),
    ("bus", 2.5),
    ("motorcycle", 1.2),
    ("truck", 2.8),
];

/// Maps a bounding-box pixel width and class label to an estimated
/// distance in meters.
#[derive(Clone, Debug)]
pub struct RangeEstimator {
    focal_length_px: f64,
    known_widths_m: HashMap<String, f64>,
}

impl RangeEstimator {
    /// Estimator with the default known-width table.
    pub fn new(focal_length_px: f64) -> Self {
        let known_widths_m = DEFAULT_KNOWN_WIDTHS_M
            .iter()
            .map(|(label, width)| (label.to_string(), *width))
            .collect();
        Self {
            focal_length_px,
            known_widths_m,
        }
    }

    /// Replace the known-width table (labels are lower-cased).
    pub fn with_known_widths(mut self, widths_m: HashMap<String, f64>) -> Self {
        self.known_widths_m = widths_m
            .into_iter()
            .map(|(label, width)| (label.to_lowercase(), width))
            .collect();
        self
    }

    pub fn focal_length_px(&self) -> f64 {
        self.focal_length_px
    }

    /// Estimate distance in meters from a bounding-box pixel width.
    ///
    /// Returns `None` for labels outside the known-width table and for
    /// non-positive or non-finite widths. `None` means "cannot warn".
    pub fn estimate(&self, label: &str, bbox_width_px: f64) -> Option<f64> {
        let known_width_m = self.known_widths_m.get(label)?;
        if !bbox_width_px.is_finite() || bbox_width_px <= 0.0 {
            return None;
        }
        Some(known_width_m * self.focal_length_px / bbox_width_px)
    }
}

impl Default for RangeEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_FOCAL_LENGTH_PX)
    }
}
