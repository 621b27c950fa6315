//! Configuration loading.
//!
//! Every field is optional; accessors resolve defaults so a missing file and an
//! empty file behave the same.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use polyglot_audio::{PcmFormat, PlaybackConfig};
use serde::Deserialize;

use crate::models::TargetLanguage;

pub const CONFIG_FILE_NAME: &str = "polyglot.toml";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Top-level configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct StudioConfig {
    pub api: Option<ApiConfig>,
    pub models: Option<ModelsConfig>,
    pub audio: Option<AudioConfig>,
    /// Language used when `--language` is omitted.
    pub default_language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiConfig {
    /// API key; falls back to `GEMINI_API_KEY` / `API_KEY`.
    pub key: Option<String>,
    pub base_url: Option<String>,
    /// Whole-request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelsConfig {
    pub text: Option<String>,
    pub image: Option<String>,
    pub tts: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioConfig {
    /// Rate the synthesized speech is decoded at (default 24000).
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
    /// Output device substring match.
    pub device: Option<String>,
    pub buffer_seconds: Option<f32>,
    pub chunk_frames: Option<usize>,
    pub refill_max_frames: Option<usize>,
}

/// Resolved model names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelNames {
    pub text: String,
    pub image: String,
    pub tts: String,
}

impl Default for ModelNames {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT_MODEL.to_string(),
            image: DEFAULT_IMAGE_MODEL.to_string(),
            tts: DEFAULT_TTS_MODEL.to_string(),
        }
    }
}

impl StudioConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<StudioConfig>(raw)?)
    }

    /// Load `explicit` if given, else `polyglot.toml` next to the executable if present,
    /// else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE_NAME)));
        match beside_exe {
            Some(path) if path.is_file() => Ok((Self::load(&path)?, Some(path))),
            _ => Ok((Self::default(), None)),
        }
    }

    /// API key from config, then the environment.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with(|name| std::env::var(name).ok())
    }

    fn api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        let configured = self.api.as_ref().and_then(|a| a.key.as_deref());
        configured
            .map(str::to_string)
            .into_iter()
            .chain(API_KEY_ENV_VARS.iter().filter_map(|name| env(name)))
            .map(|k| k.trim().to_string())
            .find(|k| !k.is_empty())
    }

    pub fn base_url(&self) -> String {
        self.api
            .as_ref()
            .and_then(|a| a.base_url.as_deref())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        let secs = self
            .api
            .as_ref()
            .and_then(|a| a.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs.max(1))
    }

    pub fn models(&self) -> ModelNames {
        let mut names = ModelNames::default();
        if let Some(m) = self.models.as_ref() {
            if let Some(text) = m.text.clone() {
                names.text = text;
            }
            if let Some(image) = m.image.clone() {
                names.image = image;
            }
            if let Some(tts) = m.tts.clone() {
                names.tts = tts;
            }
        }
        names
    }

    /// Format of synthesized speech.
    pub fn speech_format(&self) -> PcmFormat {
        let audio = self.audio.as_ref();
        PcmFormat::new(
            audio
                .and_then(|a| a.sample_rate)
                .unwrap_or(PcmFormat::SPEECH.sample_rate),
            audio
                .and_then(|a| a.channels)
                .unwrap_or(PcmFormat::SPEECH.channels),
        )
    }

    pub fn device(&self) -> Option<String> {
        self.audio.as_ref().and_then(|a| a.device.clone())
    }

    pub fn playback(&self) -> PlaybackConfig {
        let mut playback = PlaybackConfig::default();
        if let Some(a) = self.audio.as_ref() {
            if let Some(v) = a.buffer_seconds {
                playback.buffer_seconds = v;
            }
            if let Some(v) = a.chunk_frames {
                playback.chunk_frames = v;
            }
            if let Some(v) = a.refill_max_frames {
                playback.refill_max_frames = v;
            }
        }
        playback
    }

    pub fn default_language(&self) -> Result<Option<TargetLanguage>> {
        self.default_language
            .as_deref()
            .map(|raw| raw.parse::<TargetLanguage>().map_err(anyhow::Error::msg))
            .transpose()
            .context("default_language")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = StudioConfig::parse("").unwrap();
        assert_eq!(cfg.base_url(), DEFAULT_BASE_URL);
        assert_eq!(cfg.models(), ModelNames::default());
        assert_eq!(cfg.speech_format(), PcmFormat::SPEECH);
        assert_eq!(cfg.timeout(), Duration::from_secs(120));
        assert_eq!(cfg.playback().chunk_frames, 1024);
        assert!(cfg.device().is_none());
        assert!(cfg.default_language().unwrap().is_none());
    }

    #[test]
    fn toml_overrides_apply() {
        let cfg = StudioConfig::parse(
            r#"
            default_language = "fr"

            [api]
            base_url = "http://localhost:8080/v1/"
            timeout_secs = 5

            [models]
            tts = "custom-tts"

            [audio]
            sample_rate = 16000
            channels = 2
            device = "usb"
            buffer_seconds = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(cfg.base_url(), "http://localhost:8080/v1");
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.models().tts, "custom-tts");
        assert_eq!(cfg.models().text, DEFAULT_TEXT_MODEL);
        assert_eq!(cfg.speech_format(), PcmFormat::new(16_000, 2));
        assert_eq!(cfg.device().as_deref(), Some("usb"));
        assert_eq!(cfg.playback().buffer_seconds, 0.5);
        assert_eq!(cfg.default_language().unwrap(), Some(TargetLanguage::French));
    }

    #[test]
    fn api_key_prefers_config_then_env_order() {
        let env = |name: &str| match name {
            "GEMINI_API_KEY" => Some("  ".to_string()),
            "API_KEY" => Some("from-env".to_string()),
            _ => None,
        };
        assert_eq!(StudioConfig::default().api_key_with(env).as_deref(), Some("from-env"));

        let cfg = StudioConfig::parse("[api]\nkey = \"from-file\"").unwrap();
        assert_eq!(cfg.api_key_with(env).as_deref(), Some("from-file"));
        assert!(StudioConfig::default().api_key_with(|_| None).is_none());
    }

    #[test]
    fn bad_default_language_is_an_error() {
        let cfg = StudioConfig::parse("default_language = \"tlh\"").unwrap();
        assert!(cfg.default_language().is_err());
    }
}
