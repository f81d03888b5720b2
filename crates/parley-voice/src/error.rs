//! Voice pipeline error types.

use std::time::Duration;

/// Errors that can occur in the voice pipeline.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// The synthesis service failed for one chunk.
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    /// The model completion stream failed or could not be opened.
    #[error("Completion stream failed: {0}")]
    Completion(String),

    /// The audio output device is unavailable or stopped abnormally.
    #[error("Playback device error: {0}")]
    PlaybackDevice(String),

    /// The synthesized payload could not be decoded to PCM.
    #[error("Audio decode failed: {0}")]
    Decode(String),

    /// `enqueue` was called after `shutdown`.
    #[error("Playback queue is closed")]
    QueueClosed,

    /// The synthesis worker task panicked or was aborted.
    #[error("Synthesis worker died: {0}")]
    WorkerDied(String),

    /// An external call exceeded its time budget.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// Invalid configuration (voice table, language tag, credentials).
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (voice profile file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Whether this error only affects the chunk being processed.
    ///
    /// The synthesis worker logs these and moves on to the next chunk.
    #[must_use]
    pub const fn is_chunk_local(&self) -> bool {
        matches!(
            self,
            Self::Synthesis(_) | Self::PlaybackDevice(_) | Self::Decode(_) | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_local_errors() {
        assert!(VoiceError::Synthesis("bad voice".into()).is_chunk_local());
        assert!(VoiceError::PlaybackDevice("unplugged".into()).is_chunk_local());
        assert!(
            VoiceError::Timeout {
                operation: "synthesis",
                elapsed: Duration::from_secs(1)
            }
            .is_chunk_local()
        );
        assert!(!VoiceError::QueueClosed.is_chunk_local());
        assert!(!VoiceError::Completion("503".into()).is_chunk_local());
    }

    #[test]
    fn timeout_message_names_operation() {
        let err = VoiceError::Timeout {
            operation: "synthesis",
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "synthesis timed out after 1.5s");
    }
}
