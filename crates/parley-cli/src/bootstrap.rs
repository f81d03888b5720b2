//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where concrete adapters are instantiated:
//! - Completion provider (OpenAI-compatible or Gemini)
//! - Google Cloud TTS synthesizer
//! - rodio output device
//!
//! The rest of the CLI only sees the composed [`Session`].

use std::sync::Arc;
use std::time::Duration;

use parley_voice::providers::{
    DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL, GeminiCompletion, GoogleTts, OPENAI_BASE_URL,
    OpenAiCompletion,
};
use parley_voice::{
    CompletionProvider, ConversationEvent, ConversationOrchestrator, OrchestratorConfig,
    PlaybackConfig, PlaybackController, PlaybackEvent, VoiceProfiles, playback::RodioOutput,
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::CliError;
use crate::parser::{Cli, ProviderKind};

/// A fully wired conversation.
pub struct Session {
    pub orchestrator: ConversationOrchestrator,
    pub conversation_events: UnboundedReceiver<ConversationEvent>,
    pub playback_events: UnboundedReceiver<PlaybackEvent>,
}

/// Build the voice table: built-ins, overridden by `--voices` if given.
pub fn load_voices(cli: &Cli) -> Result<VoiceProfiles, CliError> {
    match &cli.voices {
        Some(path) => {
            let voices = VoiceProfiles::load_with_overrides(path)?;
            tracing::info!(path = %path.display(), "Loaded voice overrides");
            Ok(voices)
        }
        None => Ok(VoiceProfiles::default()),
    }
}

pub fn playback_config(cli: &Cli, voices: VoiceProfiles) -> PlaybackConfig {
    PlaybackConfig {
        voices,
        synthesis_timeout: Duration::from_secs(cli.synthesis_timeout),
        ..PlaybackConfig::default()
    }
}

pub fn orchestrator_config(cli: &Cli) -> OrchestratorConfig {
    let defaults = OrchestratorConfig::default();
    let stream_timeout = Duration::from_secs(cli.stream_timeout);
    OrchestratorConfig {
        system_prompt: cli.system_prompt.clone().unwrap_or(defaults.system_prompt),
        language_policy: cli.language_policy.into(),
        first_fragment_timeout: stream_timeout,
        idle_timeout: stream_timeout,
    }
}

/// Select and configure the completion provider.
///
/// api.openai.com requires a key; other OpenAI-compatible servers (local
/// llama-server and the like) may run without one.
pub fn build_completion(cli: &Cli) -> Result<Arc<dyn CompletionProvider>, CliError> {
    match cli.provider {
        ProviderKind::Openai => {
            let model = cli.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            let mut client = OpenAiCompletion::new(&cli.openai_base_url, model)
                .with_temperature(cli.temperature);
            match &cli.openai_api_key {
                Some(key) => client = client.with_api_key(key),
                None if cli.openai_base_url == OPENAI_BASE_URL => {
                    return Err(CliError::MissingCredential("OPENAI_API_KEY"));
                }
                None => {}
            }
            tracing::info!(model, base_url = %cli.openai_base_url, "Using OpenAI-compatible completion");
            Ok(Arc::new(client))
        }
        ProviderKind::Gemini => {
            let key = cli
                .gemini_api_key
                .as_deref()
                .ok_or(CliError::MissingCredential("GEMINI_API_KEY"))?;
            let model = cli.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
            tracing::info!(model, "Using Gemini completion");
            Ok(Arc::new(
                GeminiCompletion::new(key, model).with_temperature(cli.temperature),
            ))
        }
    }
}

/// Wire every adapter together and start the playback worker.
///
/// Must be called from within the Tokio runtime.
pub fn bootstrap(cli: &Cli) -> Result<Session, CliError> {
    let completion = build_completion(cli)?;
    let tts_key = cli
        .tts_api_key
        .as_deref()
        .ok_or(CliError::MissingCredential("GOOGLE_TTS_API_KEY"))?;
    let voices = load_voices(cli)?;

    let output = RodioOutput::spawn()?;
    let (controller, playback_events) = PlaybackController::start(
        Arc::new(GoogleTts::new(tts_key)),
        Arc::new(output),
        playback_config(cli, voices),
    );

    let (orchestrator, conversation_events) = ConversationOrchestrator::new(
        completion,
        Arc::new(controller),
        orchestrator_config(cli),
    );

    Ok(Session {
        orchestrator,
        conversation_events,
        playback_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use parley_voice::{LanguagePolicy, LanguageTag};

    fn cli(args: &[&str]) -> Cli {
        let mut cli = Cli::parse_from(std::iter::once("parley").chain(args.iter().copied()));
        // Keep the ambient environment out of the assertions.
        cli.openai_api_key = None;
        cli.gemini_api_key = None;
        cli.openai_base_url = OPENAI_BASE_URL.to_string();
        cli
    }

    #[test]
    fn test_openai_requires_key_for_hosted_api() {
        let err = build_completion(&cli(&[])).err().unwrap();
        assert!(matches!(err, CliError::MissingCredential("OPENAI_API_KEY")));

        let mut local = cli(&[]);
        local.openai_base_url = "http://127.0.0.1:8080/v1".to_string();
        assert!(build_completion(&local).is_ok());
    }

    #[test]
    fn test_gemini_requires_key() {
        let mut args = cli(&["--provider", "gemini"]);
        assert!(matches!(
            build_completion(&args),
            Err(CliError::MissingCredential("GEMINI_API_KEY"))
        ));

        args.gemini_api_key = Some("key".to_string());
        assert!(build_completion(&args).is_ok());
    }

    #[test]
    fn test_orchestrator_config_from_flags() {
        let config = orchestrator_config(&cli(&[
            "--stream-timeout",
            "7",
            "--language-policy",
            "per-chunk",
            "--system-prompt",
            "Be terse.",
        ]));
        assert_eq!(config.system_prompt, "Be terse.");
        assert_eq!(config.language_policy, LanguagePolicy::PerChunk);
        assert_eq!(config.first_fragment_timeout, Duration::from_secs(7));
        assert_eq!(config.idle_timeout, Duration::from_secs(7));

        let defaults = orchestrator_config(&cli(&[]));
        assert_eq!(defaults.system_prompt, OrchestratorConfig::default().system_prompt);
    }

    #[test]
    fn test_voice_overrides_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voices.json");
        std::fs::write(
            &path,
            r#"{"ar-XA": {"voiceName": "ar-XA-Wavenet-B", "speakingRate": 1.0, "pitch": 0.0}}"#,
        )
        .unwrap();

        let mut args = cli(&[]);
        args.voices = Some(path);
        let voices = load_voices(&args).unwrap();
        assert_eq!(voices.resolve(LanguageTag::ArXa).voice_name, "ar-XA-Wavenet-B");

        let config = playback_config(&args, voices);
        assert_eq!(config.synthesis_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_missing_voice_file_is_config_error() {
        let mut args = cli(&[]);
        args.voices = Some("/definitely/not/here.json".into());
        assert!(load_voices(&args).is_err());
    }
}
