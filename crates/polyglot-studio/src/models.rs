//! Domain types shared by the service, orchestration and CLI layers.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Markets the studio can localize for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetLanguage {
    Japanese,
    Spanish,
    French,
    German,
    #[serde(rename = "Mandarin Chinese")]
    MandarinChinese,
    Arabic,
}

impl TargetLanguage {
    pub const ALL: [TargetLanguage; 6] = [
        TargetLanguage::Japanese,
        TargetLanguage::Spanish,
        TargetLanguage::French,
        TargetLanguage::German,
        TargetLanguage::MandarinChinese,
        TargetLanguage::Arabic,
    ];

    /// Name used in prompts and listings.
    pub fn display_name(self) -> &'static str {
        match self {
            TargetLanguage::Japanese => "Japanese",
            TargetLanguage::Spanish => "Spanish",
            TargetLanguage::French => "French",
            TargetLanguage::German => "German",
            TargetLanguage::MandarinChinese => "Mandarin Chinese",
            TargetLanguage::Arabic => "Arabic",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            TargetLanguage::Japanese => "ja",
            TargetLanguage::Spanish => "es",
            TargetLanguage::French => "fr",
            TargetLanguage::German => "de",
            TargetLanguage::MandarinChinese => "zh",
            TargetLanguage::Arabic => "ar",
        }
    }

    /// Prebuilt TTS voice for this market.
    pub fn voice(self) -> &'static str {
        match self {
            TargetLanguage::Japanese => "Kore",
            TargetLanguage::Spanish => "Puck",
            TargetLanguage::French => "Charon",
            TargetLanguage::German => "Fenrir",
            TargetLanguage::MandarinChinese => "Kore",
            TargetLanguage::Arabic => "Zephyr",
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for TargetLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        let aliases = |lang: &TargetLanguage| -> bool {
            let name = lang.display_name().to_lowercase();
            wanted == name
                || wanted == lang.code()
                || (*lang == TargetLanguage::MandarinChinese
                    && (wanted == "mandarin" || wanted == "chinese"))
        };
        TargetLanguage::ALL
            .iter()
            .copied()
            .find(aliases)
            .ok_or_else(|| {
                let known: Vec<_> = TargetLanguage::ALL
                    .iter()
                    .map(|l| format!("{} ({})", l.display_name(), l.code()))
                    .collect();
                format!("unknown language '{s}'; expected one of: {}", known.join(", "))
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CulturalFlag {
    pub severity: Severity,
    pub issue: String,
    pub suggestion: String,
}

/// Localization analysis as returned by the model (camelCase on the wire).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizationResult {
    pub translated_text: String,
    pub cultural_notes: Vec<String>,
    pub suggested_visual_changes: String,
    pub cultural_flags: Vec<CulturalFlag>,
    pub brand_voice_check: String,
    pub quality_score: f64,
}

impl LocalizationResult {
    pub fn highest_severity(&self) -> Option<Severity> {
        self.cultural_flags
            .iter()
            .map(|f| f.severity)
            .max()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub timestamp_ms: u64,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp_ms: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_codes_and_aliases() {
        assert_eq!("Japanese".parse::<TargetLanguage>(), Ok(TargetLanguage::Japanese));
        assert_eq!(" es ".parse::<TargetLanguage>(), Ok(TargetLanguage::Spanish));
        assert_eq!(
            "MANDARIN CHINESE".parse::<TargetLanguage>(),
            Ok(TargetLanguage::MandarinChinese)
        );
        assert_eq!("zh".parse::<TargetLanguage>(), Ok(TargetLanguage::MandarinChinese));
        assert_eq!("chinese".parse::<TargetLanguage>(), Ok(TargetLanguage::MandarinChinese));
        assert!("Klingon".parse::<TargetLanguage>().is_err());
    }

    #[test]
    fn voice_map_matches_markets() {
        assert_eq!(TargetLanguage::Japanese.voice(), "Kore");
        assert_eq!(TargetLanguage::Spanish.voice(), "Puck");
        assert_eq!(TargetLanguage::French.voice(), "Charon");
        assert_eq!(TargetLanguage::German.voice(), "Fenrir");
        assert_eq!(TargetLanguage::MandarinChinese.voice(), "Kore");
        assert_eq!(TargetLanguage::Arabic.voice(), "Zephyr");
    }

    #[test]
    fn localization_result_uses_camel_case() {
        let json = r#"{
            "translatedText": "こんにちは",
            "culturalNotes": ["Use polite form"],
            "suggestedVisualChanges": "Cherry blossoms",
            "culturalFlags": [{"severity": "high", "issue": "Number 4", "suggestion": "Use 5"}],
            "brandVoiceCheck": "Preserved",
            "qualityScore": 0.92
        }"#;
        let result: LocalizationResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.translated_text, "こんにちは");
        assert_eq!(result.cultural_flags[0].severity, Severity::High);
        assert_eq!(result.highest_severity(), Some(Severity::High));

        let back = serde_json::to_value(&result).unwrap();
        assert!(back.get("brandVoiceCheck").is_some());
        assert!(back.get("brand_voice_check").is_none());
    }

    #[test]
    fn language_serializes_as_display_name() {
        let v = serde_json::to_value(TargetLanguage::MandarinChinese).unwrap();
        assert_eq!(v, serde_json::json!("Mandarin Chinese"));
    }
}
