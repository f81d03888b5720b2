//! Real-time voice conversation pipeline with barge-in.
//!
//! A streamed model reply is cut into sentence-sized chunks, each chunk is
//! synthesized and played strictly in order by a single worker, and the
//! whole queue can be silenced the moment the user starts speaking again.
//!
//! ```text
//!  utterance ─► ConversationOrchestrator ─► CompletionProvider (stream)
//!                       │                          │
//!                       │  interrupt()             ▼
//!                       │                   StreamSegmenter
//!                       ▼                          │ enqueue
//!               PlaybackController ◄───────────────┘
//!                       │ (single consumer)
//!                       ▼
//!               SynthesisWorker ─► SpeechSynthesizer ─► AudioOutput
//! ```
#![deny(unused_crate_dependencies)]

// tokio-test is only used by the integration tests
#[cfg(test)]
use tokio_test as _;

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod language;
pub mod orchestrator;
pub mod playback;
pub mod providers;
pub mod segment;
pub mod voice;
mod worker;

// Re-export key types for convenience
pub use backend::{
    ActivePlayback, AudioEncoding, AudioOutput, CompletionProvider, CompletionStream, DecodedAudio,
    EncodedAudio, SpeechSynthesizer,
};
pub use config::{LanguagePolicy, OrchestratorConfig, PlaybackConfig};
pub use controller::{PlaybackController, PlaybackEvent, SpeechChunk};
pub use error::VoiceError;
pub use language::{LanguageTag, detect};
pub use orchestrator::{ConversationEvent, ConversationOrchestrator, TurnState, TurnSummary};
pub use segment::{StreamSegmenter, clean_for_speech, segment};
pub use voice::{VoiceProfile, VoiceProfiles};
