//! Command-line interface definition.
//!
//! Every credential can come from the environment (or a `.env` file, loaded
//! before parsing), so a bare `parley` works once the keys are exported.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use parley_voice::LanguagePolicy;
use parley_voice::providers::OPENAI_BASE_URL;

/// Which streaming completion API answers the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// OpenAI or any server exposing an OpenAI-compatible `/chat/completions`.
    Openai,
    /// Google Gemini `streamGenerateContent`.
    Gemini,
}

/// `--language-policy` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Voice the whole reply in the language of the user's utterance.
    Utterance,
    /// Pick the voice for every sentence separately.
    PerChunk,
}

impl From<PolicyArg> for LanguagePolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Utterance => Self::Utterance,
            PolicyArg::PerChunk => Self::PerChunk,
        }
    }
}

/// Talk to a language model and hear the reply, interruptibly.
///
/// Each line typed on stdin is one finished utterance. Typing while the
/// assistant is speaking cuts it off and starts a new turn.
#[derive(Debug, Parser)]
#[command(name = "parley")]
#[command(about = "Multilingual voice conversation with barge-in")]
#[command(version)]
pub struct Cli {
    /// Completion API to use
    #[arg(long, value_enum, default_value_t = ProviderKind::Openai, env = "PARLEY_PROVIDER")]
    pub provider: ProviderKind,

    /// Model name (defaults per provider)
    #[arg(long, env = "PARLEY_MODEL")]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, default_value = OPENAI_BASE_URL, env = "OPENAI_BASE_URL")]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// API key for Google Cloud Text-to-Speech
    #[arg(long, env = "GOOGLE_TTS_API_KEY", hide_env_values = true)]
    pub tts_api_key: Option<String>,

    /// JSON file overriding the built-in voice of one or more languages
    #[arg(long, env = "PARLEY_VOICES")]
    pub voices: Option<PathBuf>,

    /// System prompt sent with every utterance
    #[arg(long)]
    pub system_prompt: Option<String>,

    #[arg(long, value_enum, default_value_t = PolicyArg::Utterance)]
    pub language_policy: PolicyArg,

    /// Model sampling temperature
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,

    /// Seconds one synthesis request may take
    #[arg(long, default_value_t = 15)]
    pub synthesis_timeout: u64,

    /// Seconds to wait for the first reply fragment, and between fragments
    #[arg(long, default_value_t = 20)]
    pub stream_timeout: u64,

    /// Opening line spoken at startup
    #[arg(long, default_value = "Hello! How can I help you today?")]
    pub greeting: String,

    /// Start without speaking a greeting
    #[arg(long)]
    pub no_greeting: bool,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// The greeting to speak, if any.
    pub fn greeting(&self) -> Option<&str> {
        let greeting = self.greeting.trim();
        (!self.no_greeting && !greeting.is_empty()).then_some(greeting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "parley",
            "--provider",
            "gemini",
            "--language-policy",
            "per-chunk",
            "--voices",
            "/tmp/voices.json",
            "--synthesis-timeout",
            "5",
            "-v",
        ]);
        assert_eq!(cli.provider, ProviderKind::Gemini);
        assert_eq!(LanguagePolicy::from(cli.language_policy), LanguagePolicy::PerChunk);
        assert_eq!(cli.voices, Some(PathBuf::from("/tmp/voices.json")));
        assert_eq!(cli.synthesis_timeout, 5);
        assert!(cli.verbose);
    }

    #[test]
    fn test_greeting_can_be_disabled() {
        let cli = Cli::parse_from(["parley"]);
        assert_eq!(cli.greeting(), Some("Hello! How can I help you today?"));

        let cli = Cli::parse_from(["parley", "--no-greeting"]);
        assert_eq!(cli.greeting(), None);

        let cli = Cli::parse_from(["parley", "--greeting", "  "]);
        assert_eq!(cli.greeting(), None);
    }
}
