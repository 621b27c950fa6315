//! Localization run: localize → adapt image → voice-over.
//!
//! Only the localize stage is required. Image and voice-over failures are
//! recorded in the report and logged; the run still returns the localization.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use polyglot_audio::{
    OutputFactory, OutputSession, PcmFormat, PlaybackHandle, decode_with_format,
};

use crate::error::{Result, ServiceError};
use crate::media::ProjectMedia;
use crate::models::{LocalizationResult, TargetLanguage};
use crate::service::{ImageAsset, LocalizationService};

pub const EMPTY_REQUEST_MESSAGE: &str = "Please provide some text or media to localize.";

/// Cooperative cancellation flag checked between stages.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Localize,
    Image,
    Synthesize,
    Decode,
    Playback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Localize => "localize",
            Stage::Image => "image",
            Stage::Synthesize => "synthesize",
            Stage::Decode => "decode",
            Stage::Playback => "playback",
        })
    }
}

/// Result of an optional stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Completed(T),
    Skipped(String),
    Failed { stage: Stage, error: String },
}

impl<T> StageOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }

    fn failed(stage: Stage, error: impl fmt::Display) -> Self {
        let error = error.to_string();
        tracing::warn!(%stage, "stage failed: {error}");
        StageOutcome::Failed { stage, error }
    }
}

/// A voice-over that has started playing.
#[derive(Debug)]
pub struct PlaybackSummary {
    pub bytes: usize,
    pub frames: usize,
    pub sample_rate: u32,
    pub duration: Duration,
    /// Observe or stop the playing source. Dropping it lets playback continue.
    pub handle: PlaybackHandle,
}

#[derive(Clone, Debug)]
pub struct LocalizationRequest {
    pub text: String,
    pub language: TargetLanguage,
    pub media: Option<ProjectMedia>,
    pub generate_image: bool,
    pub voice_over: bool,
}

impl LocalizationRequest {
    pub fn new(text: impl Into<String>, language: TargetLanguage) -> Self {
        Self {
            text: text.into(),
            language,
            media: None,
            generate_image: true,
            voice_over: true,
        }
    }

    pub fn with_media(mut self, media: ProjectMedia) -> Self {
        self.media = Some(media);
        self
    }
}

#[derive(Debug)]
pub struct LocalizationReport {
    pub result: LocalizationResult,
    pub image: StageOutcome<ImageAsset>,
    pub audio: StageOutcome<PlaybackSummary>,
}

impl LocalizationReport {
    /// True when an optional stage failed.
    pub fn is_partial(&self) -> bool {
        self.image.is_failed() || self.audio.is_failed()
    }
}

/// Runs requests against a service and plays speech through a shared session.
pub struct Studio<S, F: OutputFactory> {
    service: S,
    session: Arc<OutputSession<F>>,
    speech_format: PcmFormat,
}

impl<S: LocalizationService, F: OutputFactory> Studio<S, F> {
    pub fn new(service: S, session: Arc<OutputSession<F>>, speech_format: PcmFormat) -> Self {
        Self {
            service,
            session,
            speech_format,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn session(&self) -> &Arc<OutputSession<F>> {
        &self.session
    }

    /// Full run. Errors only when the request is empty, localization fails, or
    /// the run is cancelled before localization finished.
    pub fn localize(
        &self,
        request: &LocalizationRequest,
        cancel: &CancelToken,
    ) -> Result<LocalizationReport> {
        if request.text.trim().is_empty() && request.media.is_none() {
            return Err(ServiceError::InvalidRequest(EMPTY_REQUEST_MESSAGE.to_string()));
        }
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        tracing::info!(language = %request.language, media = request.media.is_some(), "localizing");
        let result = self
            .service
            .localize(&request.text, request.language, request.media.as_ref())?;

        let image = self.adapt_image(request, &result, cancel);
        let audio = if request.voice_over {
            self.voice_over(&result.translated_text, request.language, cancel)
        } else {
            StageOutcome::Skipped("voice-over disabled".to_string())
        };

        let report = LocalizationReport { result, image, audio };
        if report.is_partial() {
            tracing::warn!("localization finished with failed optional stages");
        }
        Ok(report)
    }

    /// Re-synthesize and play `text`, isolated the same way as the voice-over stage.
    pub fn speak(
        &self,
        text: &str,
        language: TargetLanguage,
        cancel: &CancelToken,
    ) -> StageOutcome<PlaybackSummary> {
        self.voice_over(text, language, cancel)
    }

    fn adapt_image(
        &self,
        request: &LocalizationRequest,
        result: &LocalizationResult,
        cancel: &CancelToken,
    ) -> StageOutcome<ImageAsset> {
        if !request.generate_image {
            return StageOutcome::Skipped("image generation disabled".to_string());
        }
        if cancel.is_cancelled() {
            return StageOutcome::Skipped("cancelled".to_string());
        }
        let prompt = result.suggested_visual_changes.trim();
        if prompt.is_empty() {
            return StageOutcome::Skipped("no visual changes suggested".to_string());
        }
        let original = request.media.as_ref().filter(|m| m.is_image());
        match self.service.generate_image(prompt, original) {
            Ok(image) => StageOutcome::Completed(image),
            Err(e) => StageOutcome::failed(Stage::Image, e),
        }
    }

    fn voice_over(
        &self,
        text: &str,
        language: TargetLanguage,
        cancel: &CancelToken,
    ) -> StageOutcome<PlaybackSummary> {
        if text.trim().is_empty() {
            return StageOutcome::Skipped("nothing to speak".to_string());
        }
        if cancel.is_cancelled() {
            return StageOutcome::Skipped("cancelled".to_string());
        }

        let bytes = match self.service.synthesize(text, language) {
            Ok(bytes) => bytes,
            Err(e) => return StageOutcome::failed(Stage::Synthesize, e),
        };
        if cancel.is_cancelled() {
            return StageOutcome::Skipped("cancelled".to_string());
        }

        let format = self.speech_format;
        let buffer = match decode_with_format(&bytes, format) {
            Ok(buffer) => buffer,
            Err(e) => return StageOutcome::failed(Stage::Decode, e),
        };
        let frames = buffer.frames();
        let duration = buffer.duration();

        match self.session.play(buffer) {
            Ok(handle) => {
                tracing::info!(
                    frames,
                    rate_hz = format.sample_rate,
                    duration_ms = duration.as_millis() as u64,
                    "voice-over playing"
                );
                StageOutcome::Completed(PlaybackSummary {
                    bytes: bytes.len(),
                    frames,
                    sample_rate: format.sample_rate,
                    duration,
                    handle,
                })
            }
            Err(e) => StageOutcome::failed(Stage::Playback, e),
        }
    }
}
