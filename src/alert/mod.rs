//! Audible and remote alerting.
//!
//! Two independent channels fire when a detection crosses the warning
//! threshold:
//! - a spoken alert through the single-flight `VoiceGate`
//! - a fire-and-forget multipart POST through `AlertDispatcher`
//!
//! Neither channel may block or fail the detection loop.

mod remote;
mod voice;

pub use remote::{AlertDispatcher, PHOTO_FILENAME};
pub use voice::{CommandSpeech, NullSpeech, SpeechBackend, StubSpeech, VoiceGate};
