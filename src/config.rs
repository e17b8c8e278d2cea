use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

use crate::range::{DEFAULT_FOCAL_LENGTH_PX, DEFAULT_KNOWN_WIDTHS_M};
use crate::session::DEFAULT_WARNING_DISTANCE_M;

const DEFAULT_CAMERA_DEVICE: &str = "auto";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_DETECTOR_INPUT: u32 = 300;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

#[derive(Debug, Deserialize, Default)]
struct ProxwarnConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    warning: Option<WarningConfigFile>,
    alert: Option<AlertConfigFile>,
    location: Option<LocationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    score_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct WarningConfigFile {
    distance_m: Option<f64>,
    focal_length_px: Option<f64>,
    known_widths_m: Option<HashMap<String, f64>>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    endpoint_url: Option<String>,
    voice_command: Option<String>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct LocationConfigFile {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Clone)]
pub struct ProxwarnConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub warning: WarningSettings,
    pub alert: AlertSettings,
    pub location: Option<LocationSettings>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub score_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct WarningSettings {
    pub distance_m: f64,
    pub focal_length_px: f64,
    /// Real-world widths in meters by class label. Defaults to the builtin
    /// table when the config file does not override it.
    pub known_widths_m: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// Remote alert endpoint. Absent disables remote dispatch.
    pub endpoint_url: Option<String>,
    /// Speech program (e.g. "espeak"). Absent means log-only voice alerts.
    pub voice_command: Option<String>,
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
pub struct LocationSettings {
    pub latitude: f64,
    pub longitude: f64,
}

impl ProxwarnConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PROXWARN_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ProxwarnConfigFile) -> Self {
        let camera = CameraSettings {
            device: file
                .camera
                .as_ref()
                .and_then(|camera| camera.device.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            target_fps: file
                .camera
                .as_ref()
                .and_then(|camera| camera.target_fps)
                .unwrap_or(DEFAULT_CAMERA_FPS),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };
        let detector = DetectorSettings {
            backend: file
                .detector
                .as_ref()
                .and_then(|detector| detector.backend.clone())
                .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
            model_path: file
                .detector
                .as_ref()
                .and_then(|detector| detector.model_path.clone()),
            input_width: file
                .detector
                .as_ref()
                .and_then(|detector| detector.input_width)
                .unwrap_or(DEFAULT_DETECTOR_INPUT),
            input_height: file
                .detector
                .as_ref()
                .and_then(|detector| detector.input_height)
                .unwrap_or(DEFAULT_DETECTOR_INPUT),
            score_threshold: file
                .detector
                .as_ref()
                .and_then(|detector| detector.score_threshold)
                .unwrap_or(DEFAULT_SCORE_THRESHOLD),
        };
        let warning = WarningSettings {
            distance_m: file
                .warning
                .as_ref()
                .and_then(|warning| warning.distance_m)
                .unwrap_or(DEFAULT_WARNING_DISTANCE_M),
            focal_length_px: file
                .warning
                .as_ref()
                .and_then(|warning| warning.focal_length_px)
                .unwrap_or(DEFAULT_FOCAL_LENGTH_PX),
            known_widths_m: file
                .warning
                .and_then(|warning| warning.known_widths_m)
                .unwrap_or_else(default_known_widths),
        };
        let alert = AlertSettings {
            endpoint_url: file.alert.as_ref().and_then(|alert| alert.endpoint_url.clone()),
            voice_command: file
                .alert
                .as_ref()
                .and_then(|alert| alert.voice_command.clone()),
            font_path: file
                .alert
                .and_then(|alert| alert.font_path)
                .or_else(|| Some(PathBuf::from(DEFAULT_FONT_PATH))),
        };
        let location = file.location.map(|location| LocationSettings {
            latitude: location.latitude,
            longitude: location.longitude,
        });
        Self {
            camera,
            detector,
            warning,
            alert,
            location,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("PROXWARN_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(url) = std::env::var("PROXWARN_ALERT_URL") {
            if !url.trim().is_empty() {
                self.alert.endpoint_url = Some(url);
            }
        }
        if let Ok(command) = std::env::var("PROXWARN_VOICE_COMMAND") {
            if !command.trim().is_empty() {
                self.alert.voice_command = Some(command);
            }
        }
        if let Ok(distance) = std::env::var("PROXWARN_WARNING_DISTANCE_M") {
            let meters: f64 = distance.parse().map_err(|_| {
                anyhow!("PROXWARN_WARNING_DISTANCE_M must be a number of meters")
            })?;
            self.warning.distance_m = meters;
        }
        if let Ok(location) = std::env::var("PROXWARN_LOCATION") {
            let parts: Vec<&str> = location.split(',').map(str::trim).collect();
            if parts.len() != 2 {
                return Err(anyhow!("PROXWARN_LOCATION must be \"latitude,longitude\""));
            }
            let latitude: f64 = parts[0]
                .parse()
                .map_err(|_| anyhow!("PROXWARN_LOCATION latitude must be a number"))?;
            let longitude: f64 = parts[1]
                .parse()
                .map_err(|_| anyhow!("PROXWARN_LOCATION longitude must be a number"))?;
            self.location = Some(LocationSettings {
                latitude,
                longitude,
            });
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be greater than zero"));
        }
        if !(self.warning.distance_m.is_finite() && self.warning.distance_m > 0.0) {
            return Err(anyhow!("warning distance must be a positive number of meters"));
        }
        if !(self.warning.focal_length_px.is_finite() && self.warning.focal_length_px > 0.0) {
            return Err(anyhow!("focal length must be a positive number of pixels"));
        }
        for (label, width) in &self.warning.known_widths_m {
            if !(width.is_finite() && *width > 0.0) {
                return Err(anyhow!(
                    "known width for '{}' must be a positive number of meters",
                    label
                ));
            }
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input dimensions must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.score_threshold) {
            return Err(anyhow!("detector score threshold must be within 0..=1"));
        }
        if let Some(url) = &self.alert.endpoint_url {
            Url::parse(url).map_err(|e| anyhow!("invalid alert endpoint url {}: {}", url, e))?;
        }
        if let Some(location) = &self.location {
            if !(-90.0..=90.0).contains(&location.latitude) {
                return Err(anyhow!("latitude must be within -90..=90"));
            }
            if !(-180.0..=180.0).contains(&location.longitude) {
                return Err(anyhow!("longitude must be within -180..=180"));
            }
        }
        Ok(())
    }

    /// Parsed alert endpoint, if remote dispatch is enabled.
    pub fn endpoint(&self) -> Result<Option<Url>> {
        self.alert
            .endpoint_url
            .as_ref()
            .map(|url| {
                Url::parse(url).map_err(|e| anyhow!("invalid alert endpoint url {}: {}", url, e))
            })
            .transpose()
    }
}

fn default_known_widths() -> HashMap<String, f64> {
    DEFAULT_KNOWN_WIDTHS_M
        .iter()
        .map(|(label, width)| (label.to_string(), *width))
        .collect()
}

fn read_config_file(path: &Path) -> Result<ProxwarnConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
