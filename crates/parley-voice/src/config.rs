//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::voice::VoiceProfiles;

/// Default system prompt for the model.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a multilingual AI assistant that responds in the \
same language as the user input. You can understand and respond in Hindi, Arabic, and English. \
Keep answers short and conversational, they are read aloud.";

/// Configuration for the [`PlaybackController`](crate::controller::PlaybackController)
/// and its synthesis worker.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Per-language voice table.
    pub voices: VoiceProfiles,

    /// Upper bound on one synthesis request.
    pub synthesis_timeout: Duration,

    /// How long `interrupt()` waits for the worker to confirm it abandoned
    /// the chunk it was working on.
    pub interrupt_ack_timeout: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            voices: VoiceProfiles::default(),
            synthesis_timeout: Duration::from_secs(15),
            interrupt_ack_timeout: Duration::from_secs(2),
        }
    }
}

/// Which text decides the voice of a reply chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LanguagePolicy {
    /// Detect once from the user's utterance and voice the whole reply with it.
    #[default]
    Utterance,

    /// Detect on every reply chunk.
    PerChunk,
}

/// Configuration for the [`ConversationOrchestrator`](crate::orchestrator::ConversationOrchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// System prompt sent with every utterance.
    pub system_prompt: String,

    pub language_policy: LanguagePolicy,

    /// Maximum wait for the first reply fragment.
    pub first_fragment_timeout: Duration,

    /// Maximum gap between two reply fragments.
    pub idle_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            language_policy: LanguagePolicy::Utterance,
            first_fragment_timeout: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(20),
        }
    }
}
