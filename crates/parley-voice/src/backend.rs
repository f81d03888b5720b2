//! Collaborator traits: engine-agnostic interfaces for the model, the
//! synthesis service and the audio device.
//!
//! The [`PlaybackController`](crate::controller::PlaybackController) and
//! [`ConversationOrchestrator`](crate::orchestrator::ConversationOrchestrator)
//! operate on trait objects (`Arc<dyn SpeechSynthesizer>`,
//! `Arc<dyn CompletionProvider>`, `Arc<dyn AudioOutput>`) so that providers
//! can be swapped, or mocked in tests, without touching the pipeline logic.
//!
//! ## Implementations
//!
//! | Trait                  | Implementor                                   |
//! |------------------------|-----------------------------------------------|
//! | [`SpeechSynthesizer`]  | [`GoogleTts`](crate::providers::GoogleTts)    |
//! | [`CompletionProvider`] | [`OpenAiCompletion`](crate::providers::OpenAiCompletion), [`GeminiCompletion`](crate::providers::GeminiCompletion) |
//! | [`AudioOutput`]        | `RodioOutput` (feature `rodio-output`)        |

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::VoiceError;
use crate::language::LanguageTag;
use crate::voice::VoiceProfile;

// ── Audio payloads ─────────────────────────────────────────────────

/// Container format of a synthesis response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Mp3,
    Wav,
    /// Headerless signed 16-bit little-endian mono PCM.
    Linear16 { sample_rate: u32 },
}

/// Encoded audio as returned by the synthesis service.
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    pub bytes: bytes::Bytes,
    pub encoding: AudioEncoding,
}

/// PCM ready for the output device.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved f32 samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,

    pub sample_rate: u32,

    pub channels: u16,
}

impl DecodedAudio {
    /// Playback length of the buffer.
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() / usize::from(self.channels);
        #[allow(clippy::cast_precision_loss)]
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }
}

// ── Speech synthesis ───────────────────────────────────────────────

/// Text-to-speech service.
///
/// Implementations must be `Send + Sync` so the synthesis worker can share
/// them across `.await` points.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one chunk of text with the given voice.
    async fn synthesize(
        &self,
        text: &str,
        profile: &VoiceProfile,
        language: LanguageTag,
    ) -> Result<EncodedAudio, VoiceError>;
}

// ── Model completion ───────────────────────────────────────────────

/// Stream of reply text fragments. Ends normally or yields one error.
pub type CompletionStream = BoxStream<'static, Result<String, VoiceError>>;

/// Streaming language-model completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Open a streaming reply for `utterance` under `system_prompt`.
    async fn stream(
        &self,
        system_prompt: &str,
        utterance: &str,
    ) -> Result<CompletionStream, VoiceError>;
}

// ── Audio device ───────────────────────────────────────────────────

/// An audio output device that plays one buffer at a time.
pub trait AudioOutput: Send + Sync {
    /// Begin playing `audio`. Returns a handle that owns the playback.
    fn start(&self, audio: DecodedAudio) -> Result<Box<dyn ActivePlayback>, VoiceError>;
}

/// One in-progress playback.
///
/// Dropping the handle must release the device; implementations stop the
/// sink in `Drop` if [`stop`](Self::stop) was not called.
#[async_trait]
pub trait ActivePlayback: Send {
    /// Resolve when the buffer has played out, or when stopped.
    async fn wait_done(&mut self) -> Result<(), VoiceError>;

    /// Abort playback immediately. Idempotent.
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_duration_accounts_for_channels() {
        let audio = DecodedAudio {
            samples: vec![0.0; 48_000],
            sample_rate: 24_000,
            channels: 2,
        };
        assert_eq!(audio.duration(), Duration::from_secs(1));
    }

    #[test]
    fn decoded_duration_of_degenerate_buffer_is_zero() {
        let audio = DecodedAudio {
            samples: vec![0.0; 10],
            sample_rate: 0,
            channels: 1,
        };
        assert_eq!(audio.duration(), Duration::ZERO);
    }
}
