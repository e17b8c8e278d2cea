//! End-to-end detection loop tests: scripted detector, synthetic camera,
//! stubbed speech, and a local TCP alert endpoint.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use url::Url;

use proxwarn::{
    AlertDispatcher, BoundingBox, CameraConfig, CameraSource, Detection, DetectionSession,
    FixedLocation, OverlayColor, OverlaySurface, RangeEstimator, SessionOptions, SessionState,
    StubBackend, StubSpeech, VoiceGate,
};

const FRAME_WIDTH: u32 = 800;
const FRAME_HEIGHT: u32 = 600;

fn person(width: f32) -> Detection {
    Detection::new(BoundingBox::new(40.0, 40.0, width, width), "person", 0.9)
}

fn labeled(label: &str, width: f32) -> Detection {
    Detection::new(BoundingBox::new(40.0, 40.0, width, width), label, 0.9)
}

fn stub_camera() -> CameraSource {
    CameraSource::new(CameraConfig {
        device: "stub://test".to_string(),
        target_fps: 0,
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
    })
    .expect("stub camera")
}

fn session_with(
    script: Vec<Vec<Detection>>,
    speech: &StubSpeech,
    dispatcher: AlertDispatcher,
) -> DetectionSession {
    DetectionSession::new(
        stub_camera(),
        Box::new(StubBackend::with_script(script)),
        RangeEstimator::new(800.0),
        VoiceGate::new(Arc::new(speech.clone())),
        dispatcher,
        OverlaySurface::new(),
        SessionOptions {
            warning_distance_m: 0.8,
            target_fps: 0,
            max_frames: None,
        },
    )
}

// ----------------------------------------------------------------------------
// Minimal alert endpoint
// ----------------------------------------------------------------------------

struct AlertServer {
    url: String,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Vec<u8>>>>,
}

/// One-thread-per-connection HTTP endpoint that drains the request and
/// answers with a fixed status line.
fn spawn_alert_server(response: &'static str) -> AlertServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind alert server");
    let addr = listener.local_addr().expect("server addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));

    let server_hits = Arc::clone(&hits);
    let server_bodies = Arc::clone(&bodies);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let hits = Arc::clone(&server_hits);
            let bodies = Arc::clone(&server_bodies);
            thread::spawn(move || {
                if let Ok(body) = read_request(&mut stream) {
                    bodies.lock().unwrap().push(body);
                }
                hits.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(response.as_bytes());
            });
        }
    });

    AlertServer {
        url: format!("http://{}/send-alert", addr),
        hits,
        bodies,
    }
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(buf);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut remaining = content_length.saturating_sub(buf.len() - header_end);
    while remaining > 0 {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        remaining = remaining.saturating_sub(n);
    }
    Ok(buf)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn wait_for_hits(hits: &Arc<AtomicUsize>, expected: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if hits.load(Ordering::SeqCst) >= expected {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

const OK_RESPONSE: &str = "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
const ERROR_RESPONSE: &str =
    "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[test]
fn far_person_draws_normal_overlay() -> Result<()> {
    let speech = StubSpeech::manual();
    // width 400 at focal 800 / known 0.5 -> 1.0m, outside the 0.8m threshold
    let mut session = session_with(
        vec![vec![person(400.0)]],
        &speech,
        AlertDispatcher::disabled(),
    );

    session.start()?;
    assert!(session.step()?);

    assert_eq!(session.alerts_raised(), 0);
    assert!(speech.utterances().is_empty());
    assert_eq!(
        session.surface().pixel(40, 40),
        Some(OverlayColor::Normal.rgb())
    );
    Ok(())
}

#[test]
fn near_person_alerts_speaks_and_dispatches_once() -> Result<()> {
    let server = spawn_alert_server(OK_RESPONSE);
    let speech = StubSpeech::manual();
    let dispatcher = AlertDispatcher::new(
        Some(Url::parse(&server.url)?),
        Arc::new(FixedLocation::new(52.52, 13.405)),
    );
    // width 600 -> 0.667m, inside the threshold
    let mut session = session_with(vec![vec![person(600.0)]], &speech, dispatcher);

    session.start()?;
    assert!(session.step()?);

    assert_eq!(session.alerts_raised(), 1);
    assert_eq!(speech.utterances(), vec!["Warning! person too close!"]);
    assert_eq!(session.dispatcher().attempts(), 1);
    assert_eq!(
        session.surface().pixel(40, 40),
        Some(OverlayColor::Alert.rgb())
    );

    assert!(wait_for_hits(&server.hits, 1), "alert never reached endpoint");
    let bodies = server.bodies.lock().unwrap();
    let body = String::from_utf8_lossy(&bodies[0]);
    assert!(body.contains("name=\"message\""));
    assert!(body.contains("ALERT: person detected too close!"));
    assert!(body.contains("name=\"latitude\""));
    assert!(body.contains("52.52"));
    assert!(body.contains("name=\"photo\"; filename=\"detected_object.png\""));
    Ok(())
}

#[test]
fn voice_alerts_debounce_while_utterance_in_flight() -> Result<()> {
    let speech = StubSpeech::manual();
    let script = vec![vec![person(600.0)], vec![person(600.0)], vec![person(600.0)]];
    let mut session = session_with(script, &speech, AlertDispatcher::disabled());

    session.start()?;
    session.step()?;
    session.step()?;
    // Second frame's alert was dropped: the first utterance is still playing.
    assert_eq!(speech.utterances().len(), 1);

    assert!(speech.finish_next());
    session.step()?;
    assert_eq!(speech.utterances().len(), 2);
    Ok(())
}

#[test]
fn unknown_class_never_alerts() -> Result<()> {
    let speech = StubSpeech::manual();
    let script = vec![
        vec![labeled("bicycle", 10.0)],
        vec![labeled("bicycle", 600.0)],
        vec![labeled("bicycle", 3000.0)],
    ];
    let mut session = session_with(script, &speech, AlertDispatcher::disabled());

    session.start()?;
    for _ in 0..3 {
        session.step()?;
    }

    assert_eq!(session.alerts_raised(), 0);
    assert!(speech.utterances().is_empty());
    Ok(())
}

#[test]
fn stop_prevents_a_pending_iteration() -> Result<()> {
    let speech = StubSpeech::manual();
    let mut session = session_with(
        vec![vec![person(400.0)]; 10],
        &speech,
        AlertDispatcher::disabled(),
    );

    session.start()?;
    assert!(session.step()?);
    let processed = session.frames_processed();

    // Stop lands between iterations, as if from the ctrl-c handler.
    session.stop_handle().stop();

    assert!(!session.step()?);
    assert_eq!(session.frames_processed(), processed);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.surface().is_clear());
    Ok(())
}

#[test]
fn endpoint_failure_does_not_interrupt_the_loop() -> Result<()> {
    let server = spawn_alert_server(ERROR_RESPONSE);
    let speech = StubSpeech::auto();
    let dispatcher = AlertDispatcher::new(
        Some(Url::parse(&server.url)?),
        Arc::new(FixedLocation::new(0.0, 0.0)),
    );
    let script = vec![vec![person(600.0)], vec![person(600.0)], vec![]];
    let mut session = session_with(script, &speech, dispatcher);

    session.start()?;
    for _ in 0..3 {
        assert!(session.step()?);
    }

    assert_eq!(session.frames_processed(), 3);
    assert_eq!(session.dispatcher().attempts(), 2);
    assert_eq!(session.state(), SessionState::Running);
    assert!(wait_for_hits(&server.hits, 2));
    Ok(())
}

#[test]
fn session_restarts_after_stop() -> Result<()> {
    let speech = StubSpeech::auto();
    let mut session = session_with(
        vec![vec![person(400.0)]; 4],
        &speech,
        AlertDispatcher::disabled(),
    );

    session.start()?;
    session.step()?;
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);

    session.start()?;
    assert_eq!(session.state(), SessionState::Running);
    session.step()?;
    assert_eq!(session.frames_processed(), 2);
    Ok(())
}

#[test]
fn run_honors_max_frames() -> Result<()> {
    let speech = StubSpeech::auto();
    let mut session = DetectionSession::new(
        stub_camera(),
        Box::new(StubBackend::new()),
        RangeEstimator::new(800.0),
        VoiceGate::new(Arc::new(speech.clone())),
        AlertDispatcher::disabled(),
        OverlaySurface::new(),
        SessionOptions {
            warning_distance_m: 0.8,
            target_fps: 0,
            max_frames: Some(3),
        },
    );

    session.run()?;
    assert_eq!(session.frames_processed(), 3);
    assert_eq!(session.state(), SessionState::Idle);
    Ok(())
}
