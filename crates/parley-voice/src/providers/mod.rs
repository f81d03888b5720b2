//! Concrete network adapters for the collaborator traits.

mod gemini;
mod google_tts;
mod openai;
mod sse;

pub use gemini::{DEFAULT_GEMINI_MODEL, GEMINI_BASE_URL, GeminiCompletion};
pub use google_tts::{GOOGLE_TTS_URL, GoogleTts};
pub use openai::{DEFAULT_OPENAI_MODEL, OPENAI_BASE_URL, OpenAiCompletion};
