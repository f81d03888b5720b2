//! Script-based language detection.
//!
//! Detection inspects codepoint ranges only. The check order is fixed
//! (Devanagari, then Arabic, then the English default), so text that mixes
//! both scripts is tagged Hindi regardless of which script dominates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VoiceError;

/// Languages the pipeline can voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum LanguageTag {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "hi-IN")]
    HiIn,
    #[serde(rename = "ar-XA")]
    ArXa,
}

impl LanguageTag {
    /// All known tags, default first.
    pub const ALL: [Self; 3] = [Self::EnUs, Self::HiIn, Self::ArXa];

    /// BCP-47 style code sent to the synthesis service.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::HiIn => "hi-IN",
            Self::ArXa => "ar-XA",
        }
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LanguageTag {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VoiceError::Config(format!("unknown language tag '{s}'")))
    }
}

const DEVANAGARI: std::ops::RangeInclusive<char> = '\u{0900}'..='\u{097F}';
const ARABIC: std::ops::RangeInclusive<char> = '\u{0600}'..='\u{06FF}';

/// Classify `text` by script. Never fails; unmatched text is English.
#[must_use]
pub fn detect(text: &str) -> LanguageTag {
    if text.chars().any(|c| DEVANAGARI.contains(&c)) {
        return LanguageTag::HiIn;
    }
    if text.chars().any(|c| ARABIC.contains(&c)) {
        return LanguageTag::ArXa;
    }
    LanguageTag::EnUs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devanagari_is_hindi() {
        assert_eq!(detect("नमस्ते आप कैसे हैं"), LanguageTag::HiIn);
    }

    #[test]
    fn arabic_is_arabic() {
        assert_eq!(detect("مرحبا كيف حالك"), LanguageTag::ArXa);
    }

    #[test]
    fn ascii_is_english() {
        assert_eq!(detect("Hello! Welcome to TATA Motors."), LanguageTag::EnUs);
        assert_eq!(detect(""), LanguageTag::EnUs);
    }

    #[test]
    fn mixed_script_resolves_by_check_order() {
        // One Devanagari letter beats a whole Arabic sentence.
        assert_eq!(detect("مرحبا كيف حالك न"), LanguageTag::HiIn);
    }

    #[test]
    fn tag_round_trips_through_code() {
        for tag in LanguageTag::ALL {
            assert_eq!(tag.code().parse::<LanguageTag>().unwrap(), tag);
        }
        assert_eq!("hi-in".parse::<LanguageTag>().unwrap(), LanguageTag::HiIn);
        assert!("fr-FR".parse::<LanguageTag>().is_err());
    }

    #[test]
    fn serde_uses_codes() {
        let json = serde_json::to_string(&LanguageTag::ArXa).unwrap();
        assert_eq!(json, "\"ar-XA\"");
    }
}
