/// Axis-aligned bounding box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One detector output per object instance.
///
/// This is the boundary type between the detector library and the rest of
/// the pipeline; backends convert their native output shape into it.
#[derive(Clone, Debug)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Class label from the detector's vocabulary.
    pub label: String,
    /// Confidence score in 0..=1. Carried for logging; the warning logic
    /// keys off range alone.
    pub score: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, label: impl Into<String>, score: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            score,
        }
    }
}
