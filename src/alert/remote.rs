//! Fire-and-forget remote alert dispatch.
//!
//! Each alert event spawns a detached thread that fetches the current
//! location, assembles a multipart/form-data body with the alert message,
//! coordinates and an annotated PNG snapshot, and POSTs it to the
//! configured endpoint. The outcome is only logged: no retry, no
//! back-pressure on the detection loop. A missing location fix downgrades
//! the alert to "no coordinates" instead of dropping it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::RngCore;
use url::Url;

use crate::geo::{GeoFix, LocationProvider, UnavailableLocation};

/// Filename advertised for the snapshot part.
pub const PHOTO_FILENAME: &str = "detected_object.png";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote alert dispatcher.
pub struct AlertDispatcher {
    endpoint: Option<Url>,
    agent: ureq::Agent,
    location: Arc<dyn LocationProvider>,
    attempts: Arc<AtomicU64>,
}

impl AlertDispatcher {
    pub fn new(endpoint: Option<Url>, location: Arc<dyn LocationProvider>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_read(HTTP_TIMEOUT)
            .timeout_write(HTTP_TIMEOUT)
            .build();
        Self {
            endpoint,
            agent,
            location,
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Dispatcher with no endpoint; every dispatch is a logged no-op.
    pub fn disabled() -> Self {
        Self::new(None, Arc::new(UnavailableLocation))
    }

    /// Number of dispatch attempts so far (counted at spawn time).
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Dispatch one alert. Never blocks and never fails the caller.
    pub fn dispatch(&self, label: &str, snapshot_png: Vec<u8>) {
        let Some(endpoint) = self.endpoint.clone() else {
            log::debug!("remote alerts disabled, dropping {} alert", label);
            return;
        };
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let agent = self.agent.clone();
        let location = Arc::clone(&self.location);
        let message = format!("ALERT: {} detected too close!", label);
        thread::spawn(move || {
            let fix = match location.current() {
                Ok(fix) => Some(fix),
                Err(err) => {
                    log::warn!(
                        "location unavailable, sending alert without coordinates: {:#}",
                        err
                    );
                    None
                }
            };
            match post_alert(&agent, &endpoint, &message, fix.as_ref(), &snapshot_png) {
                Ok(status) => log::info!("remote alert delivered ({})", status),
                Err(err) => log::warn!("remote alert dispatch failed: {:#}", err),
            }
        });
    }
}

fn post_alert(
    agent: &ureq::Agent,
    endpoint: &Url,
    message: &str,
    fix: Option<&GeoFix>,
    photo_png: &[u8],
) -> Result<u16> {
    let boundary = fresh_boundary();
    let body = encode_multipart(&boundary, message, fix, photo_png);
    let response = agent
        .post(endpoint.as_str())
        .set(
            "Content-Type",
            &format!("multipart/form-data; boundary={}", boundary),
        )
        .send_bytes(&body)
        .context("post alert")?;
    Ok(response.status())
}

fn fresh_boundary() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("proxwarn-{}", hex::encode(bytes))
}

/// Assemble a multipart/form-data body with `message`, optional
/// `latitude`/`longitude` text fields and the PNG `photo` part.
fn encode_multipart(
    boundary: &str,
    message: &str,
    fix: Option<&GeoFix>,
    photo_png: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(photo_png.len() + 512);
    push_text_part(&mut body, boundary, "message", message);
    if let Some(fix) = fix {
        push_text_part(&mut body, boundary, "latitude", &fix.latitude.to_string());
        push_text_part(&mut body, boundary, "longitude", &fix.longitude.to_string());
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
            boundary, PHOTO_FILENAME
        )
        .as_bytes(),
    );
    body.extend_from_slice(photo_png);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

fn push_text_part(body: &mut Vec<u8>, boundary: &str, name: &str, value: &str) {
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            boundary, name, value
        )
        .as_bytes(),
    );
}
