//! proxwarn - camera proximity warning pipeline.
//!
//! The crate drives a per-frame detection-to-alert pipeline: capture a
//! frame from the camera, run a pretrained object detector, estimate the
//! real-world distance to each detection from its bounding-box width, draw
//! an annotated overlay, and raise an audible + remote alert when an
//! object is judged too close.
//!
//! # Module Structure
//!
//! - `ingest`: camera sources (device selection heuristic, `stub://`
//!   synthetic source, V4L2 behind `ingest-v4l2`)
//! - `detect`: the detector boundary (scripted stub, tract-onnx behind
//!   `backend-tract`) and the `Detection` value type
//! - `range`: known-width pinhole range estimation
//! - `overlay`: annotated raster surface (boxes, labels, PNG snapshots)
//! - `alert`: single-flight voice gate and fire-and-forget remote dispatch
//! - `geo`: location collaborators for remote alerts
//! - `session`: the Idle/Running state machine orchestrating a frame loop
//! - `config`: JSON config file + env overrides

pub mod alert;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geo;
pub mod ingest;
pub mod overlay;
pub mod range;
pub mod session;

pub use alert::{
    AlertDispatcher, CommandSpeech, NullSpeech, SpeechBackend, StubSpeech, VoiceGate,
};
pub use config::ProxwarnConfig;
pub use detect::{BoundingBox, Detection, DetectorBackend, StubBackend};
pub use frame::RawFrame;
pub use geo::{FixedLocation, GeoFix, LocationProvider, UnavailableLocation};
pub use ingest::{CameraConfig, CameraSource};
pub use overlay::{OverlayColor, OverlaySurface};
pub use range::RangeEstimator;
pub use session::{
    DetectionSession, SessionOptions, SessionState, StopHandle, DEFAULT_WARNING_DISTANCE_M,
};
