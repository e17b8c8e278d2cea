//! Spoken alerts.
//!
//! `VoiceGate` is a single-flight gate over a `SpeechBackend`: at most one
//! utterance is in flight at a time, and alerts arriving while one is
//! playing are dropped rather than queued. Playback completion arrives from
//! the backend's thread, so the in-flight flag is atomic.

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Queue-free utterance playback.
///
/// Implementations must call `done` exactly once when the utterance
/// finishes (or fails) and must not block the caller.
pub trait SpeechBackend: Send + Sync {
    fn speak(&self, message: &str, done: Box<dyn FnOnce() + Send>);
}

/// Single-flight gate over a speech backend.
pub struct VoiceGate {
    in_flight: Arc<AtomicBool>,
    backend: Arc<dyn SpeechBackend>,
}

impl VoiceGate {
    pub fn new(backend: Arc<dyn SpeechBackend>) -> Self {
        Self {
            in_flight: Arc::new(AtomicBool::new(false)),
            backend,
        }
    }

    /// Speak `message` unless an utterance is already in flight.
    ///
    /// Returns true when the utterance was started; a debounced call
    /// returns false and the message is gone.
    pub fn announce(&self, message: &str) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("voice alert dropped, utterance in flight");
            return false;
        }
        let flag = Arc::clone(&self.in_flight);
        self.backend
            .speak(message, Box::new(move || flag.store(false, Ordering::Release)));
        true
    }

    pub fn is_speaking(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Headless backend: logs the message and completes immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSpeech;

impl SpeechBackend for NullSpeech {
    fn speak(&self, message: &str, done: Box<dyn FnOnce() + Send>) {
        log::info!("voice alert: {}", message);
        done();
    }
}

/// External-command backend (e.g. espeak).
///
/// The message is passed as the final argument; completion is the child
/// process exit. Spawn and exit failures are logged and still release the
/// gate.
pub struct CommandSpeech {
    program: String,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SpeechBackend for CommandSpeech {
    fn speak(&self, message: &str, done: Box<dyn FnOnce() + Send>) {
        let program = self.program.clone();
        let message = message.to_string();
        thread::spawn(move || {
            match Command::new(&program).arg(&message).status() {
                Ok(status) if !status.success() => {
                    log::warn!("speech command {} exited with {}", program, status);
                }
                Ok(_) => {}
                Err(err) => log::warn!("speech command {} failed: {}", program, err),
            }
            done();
        });
    }
}

/// Test backend recording utterances.
///
/// In auto mode utterances complete as soon as they start; in manual mode
/// they stay in flight until `finish_next` is called, which is how debounce
/// ordering is exercised.
#[derive(Clone)]
pub struct StubSpeech {
    inner: Arc<StubSpeechState>,
}

struct StubSpeechState {
    auto_complete: bool,
    utterances: Mutex<Vec<String>>,
    pending: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl StubSpeech {
    pub fn auto() -> Self {
        Self::with_mode(true)
    }

    pub fn manual() -> Self {
        Self::with_mode(false)
    }

    fn with_mode(auto_complete: bool) -> Self {
        Self {
            inner: Arc::new(StubSpeechState {
                auto_complete,
                utterances: Mutex::new(Vec::new()),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Messages spoken so far, in order.
    pub fn utterances(&self) -> Vec<String> {
        self.inner.utterances.lock().unwrap().clone()
    }

    /// Complete the oldest in-flight utterance. Returns false when nothing
    /// was pending.
    pub fn finish_next(&self) -> bool {
        let done = {
            let mut pending = self.inner.pending.lock().unwrap();
            if pending.is_empty() {
                return false;
            }
            pending.remove(0)
        };
        done();
        true
    }
}

impl SpeechBackend for StubSpeech {
    fn speak(&self, message: &str, done: Box<dyn FnOnce() + Send>) {
        self.inner
            .utterances
            .lock()
            .unwrap()
            .push(message.to_string());
        if self.inner.auto_complete {
            done();
        } else {
            self.inner.pending.lock().unwrap().push(done);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_announce_plays_exactly_one_utterance() {
        let speech = StubSpeech::manual();
        let gate = VoiceGate::new(Arc::new(speech.clone()));

        assert!(gate.announce("Warning! person too close!"));
        assert!(!gate.announce("Warning! car too close!"));
        assert_eq!(speech.utterances(), vec!["Warning! person too close!"]);
        assert!(gate.is_speaking());
    }

    #[test]
    fn gate_reopens_after_completion() {
        let speech = StubSpeech::manual();
        let gate = VoiceGate::new(Arc::new(speech.clone()));

        assert!(gate.announce("first"));
        assert!(!gate.announce("second"));

        assert!(speech.finish_next());
        assert!(!gate.is_speaking());

        assert!(gate.announce("third"));
        assert_eq!(speech.utterances(), vec!["first", "third"]);
    }

    #[test]
    fn auto_mode_completes_immediately() {
        let speech = StubSpeech::auto();
        let gate = VoiceGate::new(Arc::new(speech.clone()));

        assert!(gate.announce("one"));
        assert!(gate.announce("two"));
        assert_eq!(speech.utterances().len(), 2);
    }

    #[test]
    fn null_speech_releases_gate() {
        let gate = VoiceGate::new(Arc::new(NullSpeech));
        assert!(gate.announce("hello"));
        assert!(!gate.is_speaking());
    }
}
