//! Localization / TTS service contract and its Gemini-backed implementation.

use serde_json::json;

use crate::config::{ModelNames, StudioConfig};
use crate::error::{Result, ServiceError};
use crate::gemini::{
    Content, GeminiClient, GenerateContentRequest, GenerationConfig, ImageConfig, Part,
    SpeechConfig, pcm_rate_from_mime,
};
use crate::media::ProjectMedia;
use crate::models::{ChatMessage, LocalizationResult, TargetLanguage};

pub const CHAT_FALLBACK: &str = "I'm sorry, I couldn't process that request.";
const IMAGE_ASPECT_RATIO: &str = "16:9";

/// A generated image.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAsset")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl ImageAsset {
    /// File extension matching the mime type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

/// Everything the studio asks of the generative backend.
///
/// Calls block until the backend answers. Implementations never retry.
pub trait LocalizationService: Send + Sync {
    fn localize(
        &self,
        text: &str,
        language: TargetLanguage,
        media: Option<&ProjectMedia>,
    ) -> Result<LocalizationResult>;

    /// Generate (or, given `original`, edit) a marketing image.
    fn generate_image(&self, prompt: &str, original: Option<&ProjectMedia>) -> Result<ImageAsset>;

    /// Speak `text` with the language's voice. Returns raw PCM16 LE bytes
    /// (nominally mono 24 kHz).
    fn synthesize(&self, text: &str, language: TargetLanguage) -> Result<Vec<u8>>;

    /// One assistant turn. `history` excludes `message`.
    fn chat(
        &self,
        history: &[ChatMessage],
        message: &str,
        context: Option<&LocalizationResult>,
    ) -> Result<String>;
}

pub fn localization_prompt(text: &str, language: TargetLanguage) -> String {
    format!(
        r#"You are a world-class localization and marketing expert.
Localize the following campaign text into {language}.
Ensure you maintain the brand's voice and creative intent.

Analyze the cultural sensitivity of the provided assets.

Original Text: "{text}"

Return your analysis in the following JSON format:
{{
  "translatedText": "the localized text",
  "culturalNotes": ["note 1", "note 2"],
  "suggestedVisualChanges": "Description of how the visual elements should be changed for this target market",
  "culturalFlags": [
    {{ "severity": "high" | "medium" | "low", "issue": "desc", "suggestion": "fix" }}
  ],
  "brandVoiceCheck": "Analysis of how well the tone was preserved",
  "qualityScore": 0.95
}}"#
    )
}

pub fn localization_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "translatedText": { "type": "STRING" },
            "culturalNotes": { "type": "ARRAY", "items": { "type": "STRING" } },
            "suggestedVisualChanges": { "type": "STRING" },
            "culturalFlags": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "severity": { "type": "STRING", "enum": ["low", "medium", "high"] },
                        "issue": { "type": "STRING" },
                        "suggestion": { "type": "STRING" }
                    }
                }
            },
            "brandVoiceCheck": { "type": "STRING" },
            "qualityScore": { "type": "NUMBER" }
        },
        "required": [
            "translatedText",
            "culturalNotes",
            "suggestedVisualChanges",
            "culturalFlags",
            "brandVoiceCheck",
            "qualityScore"
        ]
    })
}

pub fn image_prompt(prompt: &str, editing: bool) -> String {
    if editing {
        format!(
            "Edit this image to fit these cultural needs: {prompt}. Keep the core product but adjust the setting, background, and color palette."
        )
    } else {
        format!(
            "Create a localized marketing image for the target market: {prompt}. Keep it professional and visually stunning."
        )
    }
}

pub fn tts_prompt(text: &str) -> String {
    format!("Professional marketing voice: {text}")
}

pub fn chat_system_instruction(context: Option<&LocalizationResult>) -> String {
    let context = serde_json::to_string(&context).unwrap_or_else(|_| "null".to_string());
    format!(
        "You are the PolyGlot Studio Assistant. You help creative teams adapt marketing campaigns.\n\
         You have access to the current localization results: {context}.\n\
         Be helpful, expert, and creative. Suggest alternatives and explain cultural nuances."
    )
}

/// Parse the model's JSON answer, tolerating a Markdown code fence around it.
pub fn parse_localization(text: &str) -> Result<LocalizationResult> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| {
        tracing::warn!("failed to parse localization response: {e}");
        ServiceError::InvalidResponse(format!("localization result: {e}"))
    })
}

/// [`LocalizationService`] over the Gemini REST API.
pub struct GeminiService {
    client: GeminiClient,
    models: ModelNames,
    expected_speech_rate: u32,
}

impl GeminiService {
    pub fn new(client: GeminiClient, models: ModelNames, expected_speech_rate: u32) -> Self {
        Self {
            client,
            models,
            expected_speech_rate,
        }
    }

    pub fn from_config(cfg: &StudioConfig) -> Result<Self> {
        let key = cfg.api_key().ok_or(ServiceError::MissingApiKey)?;
        let client = GeminiClient::new(key, &cfg.base_url(), cfg.timeout())?;
        Ok(Self::new(client, cfg.models(), cfg.speech_format().sample_rate))
    }

    pub fn models(&self) -> &ModelNames {
        &self.models
    }
}

impl LocalizationService for GeminiService {
    fn localize(
        &self,
        text: &str,
        language: TargetLanguage,
        media: Option<&ProjectMedia>,
    ) -> Result<LocalizationResult> {
        let mut parts = vec![Part::text(localization_prompt(text, language))];
        if let Some(image) = media.filter(|m| m.is_image()) {
            parts.push(Part::inline(image.mime_type.clone(), &image.bytes));
        }
        let request = GenerateContentRequest {
            contents: vec![Content::from_parts(parts)],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(localization_schema()),
                ..Default::default()
            }),
        };

        let resp = self.client.generate(&self.models.text, &request)?;
        let text = resp
            .text()
            .ok_or_else(|| ServiceError::InvalidResponse("empty localization response".into()))?;
        let result = parse_localization(&text)?;
        tracing::info!(
            language = %language,
            flags = result.cultural_flags.len(),
            quality = result.quality_score,
            "localized"
        );
        Ok(result)
    }

    fn generate_image(&self, prompt: &str, original: Option<&ProjectMedia>) -> Result<ImageAsset> {
        let original = original.filter(|m| m.is_image());
        let mut parts = Vec::with_capacity(2);
        if let Some(image) = original {
            parts.push(Part::inline(image.mime_type.clone(), &image.bytes));
        }
        parts.push(Part::text(image_prompt(prompt, original.is_some())));

        let request = GenerateContentRequest {
            contents: vec![Content::from_parts(parts)],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                image_config: Some(ImageConfig {
                    aspect_ratio: IMAGE_ASPECT_RATIO.to_string(),
                }),
                ..Default::default()
            }),
        };

        let resp = self.client.generate(&self.models.image, &request)?;
        let inline = resp.inline_data().ok_or(ServiceError::NoImage)?;
        let bytes = inline.decode()?;
        let mime_type = if inline.mime_type.starts_with("image/") {
            inline.mime_type.clone()
        } else {
            "image/png".to_string()
        };
        tracing::info!(
            %mime_type,
            bytes = bytes.len(),
            edited = original.is_some(),
            "image generated"
        );
        Ok(ImageAsset { mime_type, bytes })
    }

    fn synthesize(&self, text: &str, language: TargetLanguage) -> Result<Vec<u8>> {
        let request = GenerateContentRequest {
            contents: vec![Content::from_parts(vec![Part::text(tts_prompt(text))])],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig::prebuilt(language.voice())),
                ..Default::default()
            }),
        };

        let resp = self.client.generate(&self.models.tts, &request)?;
        let inline = resp.inline_data().ok_or(ServiceError::NoAudio)?;
        let advertised = pcm_rate_from_mime(&inline.mime_type);
        if let Some(rate) = advertised.filter(|r| *r != self.expected_speech_rate) {
            tracing::warn!(
                advertised_rate_hz = rate,
                decode_rate_hz = self.expected_speech_rate,
                "speech sample rate differs from the configured decode rate"
            );
        }
        let bytes = inline.decode()?;
        tracing::info!(voice = language.voice(), bytes = bytes.len(), "speech synthesized");
        Ok(bytes)
    }

    fn chat(
        &self,
        history: &[ChatMessage],
        message: &str,
        context: Option<&LocalizationResult>,
    ) -> Result<String> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|m| Content::with_role(m.role.as_str(), m.text.clone()))
            .collect();
        contents.push(Content::with_role("user", message));

        let request = GenerateContentRequest {
            contents,
            system_instruction: Some(Content::from_parts(vec![Part::text(
                chat_system_instruction(context),
            )])),
            generation_config: None,
        };

        let resp = self.client.generate(&self.models.text, &request)?;
        Ok(resp.text().unwrap_or_else(|| CHAT_FALLBACK.to_string()))
    }
}
