//! proxwarnd - proximity warning daemon
//!
//! This daemon:
//! 1. Resolves and opens a camera (auto-selection prefers external webcams)
//! 2. Loads the configured detector backend
//! 3. Runs the detection loop: range estimation, overlay drawing, alerts
//! 4. Speaks a warning (single-flight) and fires a remote alert when an
//!    object crosses the warning distance
//!
//! Stop with ctrl-c, or bound the run with --max-frames.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use proxwarn::{
    config::ProxwarnConfig,
    detect,
    geo::{FixedLocation, LocationProvider, UnavailableLocation},
    ingest::{enumerate_devices, select_preferred, CameraConfig, CameraSource},
    AlertDispatcher, CommandSpeech, DetectionSession, NullSpeech, OverlaySurface, RangeEstimator,
    SessionOptions, SpeechBackend, VoiceGate,
};

#[derive(Parser)]
#[command(name = "proxwarnd", about = "Camera proximity warning daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Stop after this many processed frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the detection loop (default).
    Run,
    /// List attached video devices and mark the auto-selected one.
    Devices,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Run) {
        Command::Devices => list_devices(),
        Command::Run => run(cli.max_frames),
    }
}

fn list_devices() -> Result<()> {
    let devices = enumerate_devices()?;
    if devices.is_empty() {
        println!("no video devices found");
        return Ok(());
    }
    let preferred = select_preferred(&devices).map(|device| device.path.clone());
    for device in &devices {
        let marker = if preferred.as_deref() == Some(device.path.as_str()) {
            "*"
        } else {
            " "
        };
        let label = if device.label.is_empty() {
            "(unlabeled)"
        } else {
            device.label.as_str()
        };
        println!("{} {}  {}", marker, device.path, label);
    }
    Ok(())
}

fn run(max_frames: Option<u64>) -> Result<()> {
    let cfg = ProxwarnConfig::load()?;

    let camera = CameraSource::new(CameraConfig {
        device: cfg.camera.device.clone(),
        target_fps: cfg.camera.target_fps,
        width: cfg.camera.width,
        height: cfg.camera.height,
    })?;

    let detector = detect::backend_from_settings(&cfg.detector)?;

    let estimator = RangeEstimator::new(cfg.warning.focal_length_px)
        .with_known_widths(cfg.warning.known_widths_m.clone());

    let speech: Arc<dyn SpeechBackend> = match &cfg.alert.voice_command {
        Some(command) => Arc::new(CommandSpeech::new(command.clone())),
        None => Arc::new(NullSpeech),
    };
    let voice = VoiceGate::new(speech);

    let location: Arc<dyn LocationProvider> = match &cfg.location {
        Some(fix) => Arc::new(FixedLocation::new(fix.latitude, fix.longitude)),
        None => Arc::new(UnavailableLocation),
    };
    let dispatcher = AlertDispatcher::new(cfg.endpoint()?, location);
    if cfg.alert.endpoint_url.is_none() {
        log::warn!("no alert endpoint configured, remote alerts disabled");
    }

    let surface = match &cfg.alert.font_path {
        Some(path) => OverlaySurface::with_font_path(path),
        None => OverlaySurface::new(),
    };

    let mut session = DetectionSession::new(
        camera,
        detector,
        estimator,
        voice,
        dispatcher,
        surface,
        SessionOptions {
            warning_distance_m: cfg.warning.distance_m,
            target_fps: cfg.camera.target_fps,
            max_frames,
        },
    );

    let stop = session.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("stop requested");
        stop.stop();
    })
    .context("install ctrl-c handler")?;

    log::info!(
        "proxwarnd running (warning distance {:.2}m)",
        cfg.warning.distance_m
    );
    session.run()
}
