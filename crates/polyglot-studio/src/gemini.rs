//! Minimal blocking client for the Generative Language `generateContent` endpoint.
//!
//! Only the request/response fields the studio actually uses are modelled.

use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Responses carry base64 images/audio, so the body cap is generous.
const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;
const ERROR_SNIPPET_CHARS: usize = 300;

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self { role: None, parts }
    }

    pub fn with_role(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: STANDARD.encode(bytes),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

impl InlineData {
    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.data.trim())
            .map_err(|e| ServiceError::InvalidResponse(format!("inline data is not base64: {e}")))
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

impl SpeechConfig {
    pub fn prebuilt(voice_name: &str) -> Self {
        Self {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.to_string(),
                },
            },
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    /// Concatenated text of the first candidate, if it has any.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .first_parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }

    /// First inline payload of the first candidate.
    pub fn inline_data(&self) -> Option<&InlineData> {
        self.first_parts().iter().find_map(|p| p.inline_data.as_ref())
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Map a non-2xx response body to [`ServiceError::Http`].
pub fn http_error(status: u16, body: &str) -> ServiceError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => match env.error.status {
            Some(code) if !env.error.message.is_empty() => format!("{code}: {}", env.error.message),
            Some(code) => code,
            None => env.error.message,
        },
        Err(_) => {
            let trimmed = body.trim();
            let snippet: String = trimmed.chars().take(ERROR_SNIPPET_CHARS).collect();
            if trimmed.chars().count() > ERROR_SNIPPET_CHARS {
                format!("{snippet}...")
            } else {
                snippet
            }
        }
    };
    ServiceError::Http { status, message }
}

pub fn parse_response(body: &str) -> Result<GenerateContentResponse> {
    serde_json::from_str(body)
        .map_err(|e| ServiceError::InvalidResponse(format!("decode generateContent response: {e}")))
}

/// Sample rate advertised by a PCM mime type such as `audio/L16;codec=pcm;rate=24000`.
pub fn pcm_rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, v)| v.trim().parse().ok())
}

pub struct GeminiClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ServiceError::MissingApiKey);
        }
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .user_agent(concat!("polyglot-studio/", env!("CARGO_PKG_VERSION")))
            .build();
        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    /// `POST models/{model}:generateContent`. Blocks for the whole round trip.
    pub fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = self.endpoint(model);
        let started = Instant::now();
        let resp = self
            .agent
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_str())
            .config()
            .http_status_as_error(false)
            .build()
            .send_json(request)
            .map_err(|e| ServiceError::Transport(format!("{model}: {e}")))?;

        let status = resp.status().as_u16();
        let body = resp
            .into_body()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_string()
            .map_err(|e| ServiceError::Transport(format!("{model}: read response body: {e}")))?;
        tracing::debug!(
            model,
            status,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generateContent"
        );

        if status >= 400 {
            return Err(http_error(status, &body));
        }
        let parsed = parse_response(&body)?;
        if let Some(reason) = parsed.block_reason() {
            tracing::warn!(model, reason, "prompt was blocked");
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_and_inline_data() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Hola "},
                    {"text": "mundo"},
                    {"inlineData": {"mimeType": "audio/L16;codec=pcm;rate=24000", "data": "AAEC"}}
                ]},
                "finishReason": "STOP"
            }]
        }"#;
        let resp = parse_response(body).unwrap();
        assert_eq!(resp.text().as_deref(), Some("Hola mundo"));
        let inline = resp.inline_data().unwrap();
        assert_eq!(inline.decode().unwrap(), vec![0, 1, 2]);
        assert_eq!(pcm_rate_from_mime(&inline.mime_type), Some(24_000));
    }

    #[test]
    fn empty_candidates_have_no_text() {
        let resp = parse_response(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(resp.text().is_none());
        assert!(resp.inline_data().is_none());
        assert_eq!(resp.block_reason(), Some("SAFETY"));
    }

    #[test]
    fn http_errors_use_api_message() {
        let body = r#"{"error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}}"#;
        match http_error(403, body) {
            ServiceError::Http { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "PERMISSION_DENIED: API key not valid");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn http_errors_fall_back_to_body_snippet() {
        let long = "x".repeat(400);
        let ServiceError::Http { message, .. } = http_error(502, &long) else {
            panic!("expected Http");
        };
        assert_eq!(message.len(), ERROR_SNIPPET_CHARS + 3);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn request_serializes_camel_case_and_skips_empty() {
        let req = GenerateContentRequest {
            contents: vec![Content::from_parts(vec![Part::text("hi")])],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".into()]),
                speech_config: Some(SpeechConfig::prebuilt("Kore")),
                ..Default::default()
            }),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hi");
        assert!(v["contents"][0].get("role").is_none());
        assert!(v.get("systemInstruction").is_none());
        assert_eq!(
            v.pointer("/generationConfig/speechConfig/voiceConfig/prebuiltVoiceConfig/voiceName"),
            Some(&serde_json::json!("Kore"))
        );
        assert!(v["generationConfig"].get("imageConfig").is_none());
    }

    #[test]
    fn blank_key_is_rejected() {
        assert!(matches!(
            GeminiClient::new("  ", "http://localhost", Duration::from_secs(1)),
            Err(ServiceError::MissingApiKey)
        ));
    }

    #[test]
    fn mime_without_rate_has_none() {
        assert_eq!(pcm_rate_from_mime("audio/wav"), None);
        assert_eq!(pcm_rate_from_mime("audio/L16; Rate=16000"), Some(16_000));
    }
}
