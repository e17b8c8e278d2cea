//! Frame ingestion sources.
//!
//! This module provides the camera side of the pipeline:
//! - enumerating attached video devices and selecting one by the
//!   preferred-label heuristic
//! - a synthetic `stub://` source for tests and demos
//! - a real V4L2 source behind the `ingest-v4l2` feature
//!
//! All sources produce `RawFrame` instances. The ingestion layer is
//! responsible for device resolution and frame capture only; it does not
//! inspect, store or transmit frames.

pub mod camera;

pub use camera::{
    enumerate_devices, select_preferred, CameraConfig, CameraInfo, CameraSource, CameraStats,
};
