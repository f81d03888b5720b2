//! CLI-specific error types and mappings.

use parley_voice::VoiceError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// A required API key was neither passed nor found in the environment.
    #[error("Missing credential: set {0} or pass it on the command line")]
    MissingCredential(&'static str),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The audio output device could not be opened.
    #[error("Audio device error: {0}")]
    Audio(String),

    /// Pipeline error.
    #[error("{0}")]
    Voice(VoiceError),
}

impl CliError {
    /// Map error to appropriate exit code (see sysexits.h).
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::MissingCredential(_) | Self::Config(_) => 78, // EX_CONFIG
            Self::Audio(_) => 69,                               // EX_UNAVAILABLE
            Self::Voice(_) => 1,
        }
    }
}

impl From<VoiceError> for CliError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::Config(msg) => Self::Config(msg),
            VoiceError::PlaybackDevice(msg) => Self::Audio(msg),
            other => Self::Voice(other),
        }
    }
}
