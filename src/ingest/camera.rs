//! Camera frame source.
//!
//! `CameraSource` wraps either a synthetic generator (`stub://` device
//! paths) or a real V4L2 capture device (`ingest-v4l2` feature). The
//! special device name `auto` resolves at connect time by enumerating
//! attached devices and applying the preferred-label heuristic: external
//! webcams tend to carry "usb"/"otg"/"external"/"hd" in their labels, so
//! those win; otherwise the last enumerated device is used.

use anyhow::{anyhow, Result};

use crate::frame::RawFrame;

#[cfg(feature = "ingest-v4l2")]
use anyhow::Context;

/// Label substrings that mark a device as the preferred external camera.
pub const PREFERRED_LABEL_KEYWORDS: [&str; 4] = ["usb", "otg", "external", "hd"];

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device to open: `auto`, `stub://<name>`, or a node path such as
    /// `/dev/video0`.
    pub device: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "auto".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// An enumerated video input device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraInfo {
    pub path: String,
    pub label: String,
}

/// Pick the preferred device from an enumeration.
///
/// First device whose label contains a preferred keyword
/// (case-insensitive) wins; the fallback is the last enumerated device.
pub fn select_preferred(devices: &[CameraInfo]) -> Option<&CameraInfo> {
    devices
        .iter()
        .find(|device| {
            let label = device.label.to_lowercase();
            PREFERRED_LABEL_KEYWORDS
                .iter()
                .any(|keyword| label.contains(keyword))
        })
        .or_else(|| devices.last())
}

/// Enumerate attached video capture devices.
///
/// Without the `ingest-v4l2` feature there is nothing to enumerate and the
/// result is empty.
pub fn enumerate_devices() -> Result<Vec<CameraInfo>> {
    #[cfg(feature = "ingest-v4l2")]
    {
        let devices = v4l::context::enum_devices()
            .into_iter()
            .map(|node| CameraInfo {
                path: node.path().display().to_string(),
                label: node.name().unwrap_or_default(),
            })
            .collect();
        Ok(devices)
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Ok(Vec::new())
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceSource),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(config)),
            });
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(DeviceSource::new(config)),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow!(
                "camera device '{}' requires the ingest-v4l2 feature (stub:// sources work without it)",
                config.device
            ))
        }
    }

    /// Open the camera stream. For `auto` devices this is where device
    /// enumeration and selection happen; failure here aborts session start.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    /// Capture the next frame.
    pub fn next_frame(&mut self) -> Result<RawFrame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    /// Human-readable description of the resolved device.
    pub fn describe(&self) -> String {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.config.device.clone(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.describe(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticSource {
    config: CameraConfig,
    frame_count: u64,
}

impl SyntheticSource {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "CameraSource: connected to {} (synthetic)",
            self.config.device
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        RawFrame::new(pixels, self.config.width, self.config.height)
    }

    /// Deterministic drifting gradient; frames differ run to run only by
    /// frame index, which keeps tests reproducible.
    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count * 7) % 256) as u8;
        }
        pixels
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// V4L2 device source
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceSource {
    config: CameraConfig,
    resolved_path: Option<String>,
    state: Option<DeviceState>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[cfg(feature = "ingest-v4l2")]
#[ouroboros::self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceSource {
    fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            resolved_path: None,
            state: None,
            frame_count: 0,
        }
    }

    fn resolve_path(&self) -> Result<String> {
        if self.config.device != "auto" {
            return Ok(self.config.device.clone());
        }
        let devices = enumerate_devices()?;
        if devices.is_empty() {
            return Err(anyhow!("no camera detected; connect a webcam"));
        }
        let selected = select_preferred(&devices)
            .ok_or_else(|| anyhow!("no camera detected; connect a webcam"))?;
        log::info!(
            "CameraSource: selected {} ({})",
            selected.path,
            if selected.label.is_empty() {
                "unlabeled"
            } else {
                selected.label.as_str()
            }
        );
        Ok(selected.path.clone())
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = self.resolve_path()?;

        let mut device = v4l::Device::with_path(&path)
            .with_context(|| format!("open camera device {}", path))?;
        let mut format = device.format().context("read camera format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("CameraSource: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .context("read camera format after set failure")?
            }
        };

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("CameraSource: failed to set fps on {}: {}", path, err);
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create camera buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);
        self.resolved_path = Some(path.clone());

        log::info!(
            "CameraSource: connected to {} ({}x{})",
            path,
            self.active_width,
            self.active_height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("camera not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| anyhow::Error::new(err).context("capture camera frame"))?;

        self.frame_count += 1;
        RawFrame::new(buf.to_vec(), self.active_width, self.active_height)
    }

    fn describe(&self) -> String {
        self.resolved_path
            .clone()
            .unwrap_or_else(|| self.config.device.clone())
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.describe(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn info(path: &str, label: &str) -> CameraInfo {
        CameraInfo {
            path: path.to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn keyword_label_beats_position() {
        let devices = vec![
            info("/dev/video0", "Integrated Camera"),
            info("/dev/video2", "USB 2.0 Webcam"),
            info("/dev/video4", "Rear Camera"),
        ];
        assert_eq!(select_preferred(&devices).unwrap().path, "/dev/video2");
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let devices = vec![
            info("/dev/video0", "Integrated Camera"),
            info("/dev/video2", "External HD Cam"),
        ];
        assert_eq!(select_preferred(&devices).unwrap().path, "/dev/video2");
    }

    #[test]
    fn fallback_is_last_enumerated_device() {
        let devices = vec![
            info("/dev/video0", "Integrated Camera"),
            info("/dev/video2", "Rear Camera"),
        ];
        assert_eq!(select_preferred(&devices).unwrap().path, "/dev/video2");
    }

    #[test]
    fn empty_enumeration_selects_nothing() {
        assert!(select_preferred(&[]).is_none());
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let config = CameraConfig {
            device: "stub://test".to_string(),
            ..CameraConfig::default()
        };
        let mut source = CameraSource::new(config)?;
        source.connect()?;

        let frame = source.next_frame()?;
        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn synthetic_frames_drift_between_captures() -> Result<()> {
        let config = CameraConfig {
            device: "stub://test".to_string(),
            width: 16,
            height: 8,
            ..CameraConfig::default()
        };
        let mut source = CameraSource::new(config)?;
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_ne!(first.pixels(), second.pixels());
        Ok(())
    }
}
