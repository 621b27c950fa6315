//! PolyGlot Studio: campaign localization with image adaptation and spoken
//! voice-over, on top of `polyglot-audio`.

pub mod assistant;
pub mod config;
pub mod error;
pub mod gemini;
pub mod media;
pub mod models;
pub mod orchestrator;
pub mod service;

pub use error::{Result, ServiceError};
pub use models::{ChatMessage, CulturalFlag, LocalizationResult, Role, Severity, TargetLanguage};
pub use orchestrator::{
    CancelToken, LocalizationReport, LocalizationRequest, PlaybackSummary, Stage, StageOutcome,
    Studio,
};
pub use service::{GeminiService, ImageAsset, LocalizationService};
