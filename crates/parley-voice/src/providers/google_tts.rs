//! Google Cloud Text-to-Speech over the REST `text:synthesize` endpoint.
//!
//! Authenticates with an API key. The response carries the audio as a
//! base64 `audioContent` string; MP3 is requested so the payload stays small.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::backend::{AudioEncoding, EncodedAudio, SpeechSynthesizer};
use crate::error::VoiceError;
use crate::language::LanguageTag;
use crate::voice::VoiceProfile;

pub const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'static str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
    pitch: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

/// Google Cloud TTS client.
#[derive(Debug, Clone)]
pub struct GoogleTts {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleTts {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: GOOGLE_TTS_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Point the client at a different endpoint (emulators, proxies).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn request_body<'a>(
    text: &'a str,
    profile: &'a VoiceProfile,
    language: LanguageTag,
) -> SynthesizeRequest<'a> {
    SynthesizeRequest {
        input: SynthesisInput { text },
        voice: VoiceSelection {
            language_code: language.code(),
            name: &profile.voice_name,
        },
        audio_config: AudioConfig {
            audio_encoding: "MP3",
            speaking_rate: profile.speaking_rate,
            pitch: profile.pitch,
        },
    }
}

fn decode_response(response: SynthesizeResponse) -> Result<EncodedAudio, VoiceError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(response.audio_content.as_bytes())
        .map_err(|e| VoiceError::Synthesis(format!("invalid audioContent: {e}")))?;
    if bytes.is_empty() {
        return Err(VoiceError::Synthesis("empty audioContent".to_string()));
    }
    Ok(EncodedAudio {
        bytes: bytes.into(),
        encoding: AudioEncoding::Mp3,
    })
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(
        &self,
        text: &str,
        profile: &VoiceProfile,
        language: LanguageTag,
    ) -> Result<EncodedAudio, VoiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(text, profile, language))
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!("HTTP {status}: {body}")));
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("malformed response: {e}")))?;

        let audio = decode_response(parsed)?;
        tracing::debug!(
            language = %language,
            voice = %profile.voice_name,
            bytes = audio.bytes.len(),
            "Synthesized chunk"
        );
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let profile = VoiceProfile::new("hi-IN-Neural2-D", 1.0, 1.5);
        let body = serde_json::to_value(request_body("नमस्ते", &profile, LanguageTag::HiIn)).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "input": {"text": "नमस्ते"},
                "voice": {"languageCode": "hi-IN", "name": "hi-IN-Neural2-D"},
                "audioConfig": {"audioEncoding": "MP3", "speakingRate": 1.0, "pitch": 1.5}
            })
        );
    }

    #[test]
    fn audio_content_is_base64_decoded() {
        let response: SynthesizeResponse =
            serde_json::from_str(r#"{"audioContent":"SUQzBA=="}"#).unwrap();
        let audio = decode_response(response).unwrap();
        assert_eq!(audio.encoding, AudioEncoding::Mp3);
        assert_eq!(&audio.bytes[..], b"ID3\x04");
    }

    #[test]
    fn invalid_or_empty_audio_is_synthesis_error() {
        let bad = SynthesizeResponse {
            audio_content: "***".to_string(),
        };
        assert!(matches!(decode_response(bad), Err(VoiceError::Synthesis(_))));

        let empty = SynthesizeResponse {
            audio_content: String::new(),
        };
        assert!(matches!(decode_response(empty), Err(VoiceError::Synthesis(_))));
    }
}
