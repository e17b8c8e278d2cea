//! Detection session: the per-frame orchestrator.
//!
//! A session is a two-state machine:
//! - **Idle -> Running** (`start`): acquire the camera stream, warm up the
//!   detector (model load), then begin iterating. Either failure aborts the
//!   transition; the loop never starts half-wired.
//! - **Running** (`step`, driven by `run`): capture a frame, render it to
//!   the overlay surface, run the detector once, then for each detection
//!   estimate its range, pick the overlay color, fire the voice gate and
//!   one remote dispatch when it is too close, and draw the box + label.
//! - **Running -> Idle** (`stop` / stop handle): clear the surface; the
//!   stop flag is checked at the top of each iteration, so an in-flight
//!   frame completes but nothing re-schedules after it.
//!
//! Sessions are restartable indefinitely. Restarting reconnects the camera;
//! the detector stays loaded across cycles (`warm_up` is idempotent).
//!
//! A single frame's failure is a skip, not a session failure: `run` logs it
//! and keeps iterating.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::alert::{AlertDispatcher, VoiceGate};
use crate::detect::DetectorBackend;
use crate::ingest::CameraSource;
use crate::overlay::{OverlayColor, OverlaySurface};
use crate::range::RangeEstimator;

/// Objects estimated closer than this many meters trigger an alert.
pub const DEFAULT_WARNING_DISTANCE_M: f64 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub warning_distance_m: f64,
    /// Frame pacing for `run`. 0 disables pacing.
    pub target_fps: u32,
    /// Stop after this many processed frames (`run` only).
    pub max_frames: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            warning_distance_m: DEFAULT_WARNING_DISTANCE_M,
            target_fps: 10,
            max_frames: None,
        }
    }
}

/// Requests the Running -> Idle transition from another thread (ctrl-c
/// handler, tests).
#[derive(Clone)]
pub struct StopHandle {
    active: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }
}

pub struct DetectionSession {
    camera: CameraSource,
    detector: Box<dyn DetectorBackend>,
    estimator: RangeEstimator,
    voice: VoiceGate,
    dispatcher: AlertDispatcher,
    surface: OverlaySurface,
    options: SessionOptions,
    active: Arc<AtomicBool>,
    state: SessionState,
    frames: u64,
    alerts: u64,
}

impl DetectionSession {
    pub fn new(
        camera: CameraSource,
        detector: Box<dyn DetectorBackend>,
        estimator: RangeEstimator,
        voice: VoiceGate,
        dispatcher: AlertDispatcher,
        surface: OverlaySurface,
        options: SessionOptions,
    ) -> Self {
        Self {
            camera,
            detector,
            estimator,
            voice,
            dispatcher,
            surface,
            options,
            active: Arc::new(AtomicBool::new(false)),
            state: SessionState::Idle,
            frames: 0,
            alerts: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            active: Arc::clone(&self.active),
        }
    }

    pub fn surface(&self) -> &OverlaySurface {
        &self.surface
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn alerts_raised(&self) -> u64 {
        self.alerts
    }

    /// Idle -> Running. Acquires the camera and loads the detector model;
    /// either failure aborts the transition and the session stays Idle.
    pub fn start(&mut self) -> Result<()> {
        if self.state == SessionState::Running {
            return Ok(());
        }
        self.camera.connect().context("acquire camera stream")?;
        self.detector.warm_up().context("load detector model")?;
        self.active.store(true, Ordering::Release);
        self.state = SessionState::Running;
        log::info!(
            "detection started (camera={}, detector={})",
            self.camera.describe(),
            self.detector.name()
        );
        Ok(())
    }

    /// One iteration. Returns false (doing no work) once the session has
    /// left Running, including when a stop was requested while the
    /// previous iteration was still in flight.
    pub fn step(&mut self) -> Result<bool> {
        if self.state != SessionState::Running {
            return Ok(false);
        }
        if !self.active.load(Ordering::Acquire) {
            self.finish();
            return Ok(false);
        }
        self.process_frame()?;
        Ok(true)
    }

    /// Drive the loop until stopped. Per-frame failures are logged and
    /// skipped; only the start transition can fail.
    pub fn run(&mut self) -> Result<()> {
        self.start()?;
        let pace = if self.options.target_fps > 0 {
            Duration::from_millis((1000 / self.options.target_fps).max(1) as u64)
        } else {
            Duration::ZERO
        };

        loop {
            let began = Instant::now();
            match self.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => log::warn!("frame skipped: {:#}", err),
            }
            if self
                .options
                .max_frames
                .is_some_and(|limit| self.frames >= limit)
            {
                self.stop();
                break;
            }
            let elapsed = began.elapsed();
            if pace > elapsed {
                std::thread::sleep(pace - elapsed);
            }
        }
        Ok(())
    }

    /// Running -> Idle.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if self.state == SessionState::Running {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.surface.clear();
        self.state = SessionState::Idle;
        log::info!(
            "detection stopped after {} frames, {} alerts",
            self.frames,
            self.alerts
        );
    }

    fn process_frame(&mut self) -> Result<()> {
        let frame = self.camera.next_frame().context("capture frame")?;
        self.surface.reset_to(&frame)?;
        let detections = self.detector.detect(&frame).context("run detector")?;
        self.frames += 1;

        for detection in &detections {
            let label = detection.label.to_lowercase();
            let range_m = self.estimator.estimate(&label, detection.bbox.width as f64);
            let too_close = range_m.is_some_and(|d| d < self.options.warning_distance_m);
            let color = if too_close {
                OverlayColor::Alert
            } else {
                OverlayColor::Normal
            };

            if too_close {
                self.alerts += 1;
                self.voice
                    .announce(&format!("Warning! {} too close!", label));
                match self.surface.encode_png() {
                    Ok(snapshot) => self.dispatcher.dispatch(&label, snapshot),
                    Err(err) => {
                        log::warn!("snapshot encode failed, skipping remote alert: {:#}", err)
                    }
                }
            }

            self.surface
                .draw_detection(&detection.bbox, &overlay_label(&label, range_m), color);
        }

        log::debug!(
            "frame #{}: {} detections",
            self.frames,
            detections.len()
        );
        Ok(())
    }
}

fn overlay_label(label: &str, range_m: Option<f64>) -> String {
    match range_m {
        Some(distance) => format!("{} - {:.2}m", label, distance),
        None => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_label_includes_range_when_known() {
        assert_eq!(overlay_label("person", Some(1.0)), "person - 1.00m");
        assert_eq!(overlay_label("bicycle", None), "bicycle");
    }
}
