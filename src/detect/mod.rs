//! Object detection boundary.
//!
//! Detection is delegated entirely to a pretrained model behind the
//! `DetectorBackend` trait. The scripted stub backend is always available;
//! the tract-onnx backend is feature-gated (`backend-tract`).

use anyhow::{anyhow, Result};

mod backend;
mod backends;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection};

use crate::config::DetectorSettings;

/// Build a detector backend from configuration.
pub fn backend_from_settings(settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => Ok(Box::new(StubBackend::new())),
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let model_path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("detector backend 'tract' requires detector.model_path"))?;
            Ok(Box::new(
                TractBackend::new(model_path, settings.input_width, settings.input_height)
                    .with_threshold(settings.score_threshold),
            ))
        }
        #[cfg(not(feature = "backend-tract"))]
        "tract" => Err(anyhow!(
            "detector backend 'tract' requires building with the backend-tract feature"
        )),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}
