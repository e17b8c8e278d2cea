use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::RawFrame;

/// Scripted stub backend for tests and demos.
///
/// Plays back a fixed per-frame script of detections; frames past the end
/// of the script yield no detections. The warm-up flag mirrors a real
/// backend's model load so session start ordering can be asserted.
pub struct StubBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
    warmed: bool,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    /// Backend that returns `script[n]` for the n-th frame.
    pub fn with_script(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            cursor: 0,
            warmed: false,
        }
    }

    pub fn frames_served(&self) -> usize {
        self.cursor
    }

    pub fn is_warmed(&self) -> bool {
        self.warmed
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn warm_up(&mut self) -> Result<()> {
        self.warmed = true;
        Ok(())
    }

    fn detect(&mut self, _frame: &RawFrame) -> Result<Vec<Detection>> {
        let detections = self.script.get(self.cursor).cloned().unwrap_or_default();
        self.cursor += 1;
        Ok(detections)
    }
}
