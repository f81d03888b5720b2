//! Per-language voice parameters.
//!
//! The table is built once at startup (built-in defaults, optionally
//! overridden from a JSON file) and only read afterwards.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VoiceError;
use crate::language::LanguageTag;

/// Synthesis parameters for one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProfile {
    /// Provider voice identifier (e.g. `"en-US-Neural2-J"`).
    pub voice_name: String,

    /// Speaking rate multiplier, strictly positive.
    pub speaking_rate: f32,

    /// Pitch offset in semitones.
    pub pitch: f32,
}

impl VoiceProfile {
    #[must_use]
    pub fn new(voice_name: impl Into<String>, speaking_rate: f32, pitch: f32) -> Self {
        Self {
            voice_name: voice_name.into(),
            speaking_rate,
            pitch,
        }
    }
}

/// Static language → voice lookup with a guaranteed default entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<LanguageTag, VoiceProfile>", into = "BTreeMap<LanguageTag, VoiceProfile>")]
pub struct VoiceProfiles {
    profiles: BTreeMap<LanguageTag, VoiceProfile>,
}

impl VoiceProfiles {
    /// Tag whose profile is used when a language has no entry.
    pub const DEFAULT_TAG: LanguageTag = LanguageTag::EnUs;

    /// Build a table, rejecting missing defaults and non-positive rates.
    pub fn new(profiles: BTreeMap<LanguageTag, VoiceProfile>) -> Result<Self, VoiceError> {
        if !profiles.contains_key(&Self::DEFAULT_TAG) {
            return Err(VoiceError::Config(format!(
                "voice table must define the default language {}",
                Self::DEFAULT_TAG
            )));
        }
        for (tag, profile) in &profiles {
            if !(profile.speaking_rate.is_finite() && profile.speaking_rate > 0.0) {
                return Err(VoiceError::Config(format!(
                    "speaking rate for {tag} must be positive, got {}",
                    profile.speaking_rate
                )));
            }
            if profile.voice_name.trim().is_empty() {
                return Err(VoiceError::Config(format!("voice name for {tag} is empty")));
            }
        }
        Ok(Self { profiles })
    }

    /// Built-in table, overlaid with any entries from a JSON file.
    ///
    /// The file is an object keyed by language code:
    /// `{"hi-IN": {"voiceName": "...", "speakingRate": 1.0, "pitch": 0.0}}`.
    pub fn load_with_overrides(path: &Path) -> Result<Self, VoiceError> {
        let raw = std::fs::read_to_string(path)?;
        let overrides: BTreeMap<LanguageTag, VoiceProfile> = serde_json::from_str(&raw)
            .map_err(|e| VoiceError::Config(format!("{}: {e}", path.display())))?;

        let mut profiles = Self::default().profiles;
        profiles.extend(overrides);

        tracing::info!(path = %path.display(), entries = profiles.len(), "Loaded voice profiles");
        Self::new(profiles)
    }

    /// Resolve the profile for `tag`, falling back to the default entry.
    #[must_use]
    pub fn resolve(&self, tag: LanguageTag) -> &VoiceProfile {
        if let Some(profile) = self.profiles.get(&tag) {
            return profile;
        }
        tracing::debug!(language = %tag, fallback = %Self::DEFAULT_TAG, "No voice profile, using default");
        &self.profiles[&Self::DEFAULT_TAG]
    }

    /// Whether `tag` has its own entry.
    #[must_use]
    pub fn contains(&self, tag: LanguageTag) -> bool {
        self.profiles.contains_key(&tag)
    }
}

impl Default for VoiceProfiles {
    fn default() -> Self {
        let profiles = BTreeMap::from([
            (LanguageTag::EnUs, VoiceProfile::new("en-US-Neural2-J", 1.1, 2.0)),
            (LanguageTag::HiIn, VoiceProfile::new("hi-IN-Neural2-D", 1.0, 1.5)),
            (LanguageTag::ArXa, VoiceProfile::new("ar-XA-Standard-D", 0.95, 1.2)),
        ]);
        Self { profiles }
    }
}

impl TryFrom<BTreeMap<LanguageTag, VoiceProfile>> for VoiceProfiles {
    type Error = VoiceError;

    fn try_from(profiles: BTreeMap<LanguageTag, VoiceProfile>) -> Result<Self, Self::Error> {
        Self::new(profiles)
    }
}

impl From<VoiceProfiles> for BTreeMap<LanguageTag, VoiceProfile> {
    fn from(table: VoiceProfiles) -> Self {
        table.profiles
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builtin_table_covers_every_tag() {
        let table = VoiceProfiles::default();
        for tag in LanguageTag::ALL {
            assert!(table.contains(tag), "missing {tag}");
        }
        assert_eq!(table.resolve(LanguageTag::HiIn).voice_name, "hi-IN-Neural2-D");
    }

    #[test]
    fn missing_entry_falls_back_to_default() {
        let table = VoiceProfiles::new(BTreeMap::from([(
            LanguageTag::EnUs,
            VoiceProfile::new("en-US-Standard-A", 1.0, 0.0),
        )]))
        .unwrap();
        assert_eq!(table.resolve(LanguageTag::ArXa).voice_name, "en-US-Standard-A");
    }

    #[test]
    fn rejects_table_without_default() {
        let err = VoiceProfiles::new(BTreeMap::from([(
            LanguageTag::HiIn,
            VoiceProfile::new("hi-IN-Neural2-D", 1.0, 0.0),
        )]))
        .unwrap_err();
        assert!(matches!(err, VoiceError::Config(_)));
    }

    #[test]
    fn rejects_non_positive_rate() {
        let err = VoiceProfiles::new(BTreeMap::from([(
            LanguageTag::EnUs,
            VoiceProfile::new("en-US-Neural2-J", 0.0, 0.0),
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn file_overrides_merge_with_builtins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"ar-XA": {{"voiceName": "ar-XA-Wavenet-B", "speakingRate": 1.0, "pitch": 0.0}}}}"#
        )
        .unwrap();

        let table = VoiceProfiles::load_with_overrides(file.path()).unwrap();
        assert_eq!(table.resolve(LanguageTag::ArXa).voice_name, "ar-XA-Wavenet-B");
        assert_eq!(table.resolve(LanguageTag::EnUs).voice_name, "en-US-Neural2-J");
    }

    #[test]
    fn malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = VoiceProfiles::load_with_overrides(file.path()).unwrap_err();
        assert!(matches!(err, VoiceError::Config(_)));
    }
}
