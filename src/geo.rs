//! Location collaborators for remote alerts.
//!
//! A `LocationProvider` answers "where is this device right now". Lookup
//! failures are recoverable: the alert dispatcher sends the alert without
//! coordinates rather than dropping it.

use anyhow::{anyhow, Result};

/// A position fix in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
}

pub trait LocationProvider: Send + Sync {
    fn current(&self) -> Result<GeoFix>;
}

/// Fixed coordinates from configuration, for stationary installs.
#[derive(Clone, Copy, Debug)]
pub struct FixedLocation {
    fix: GeoFix,
}

impl FixedLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            fix: GeoFix {
                latitude,
                longitude,
            },
        }
    }
}

impl LocationProvider for FixedLocation {
    fn current(&self) -> Result<GeoFix> {
        Ok(self.fix)
    }
}

/// Provider for installs without a position source. Always fails, which
/// the dispatcher treats as "send without coordinates".
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableLocation;

impl LocationProvider for UnavailableLocation {
    fn current(&self) -> Result<GeoFix> {
        Err(anyhow!("no location source configured"))
    }
}
