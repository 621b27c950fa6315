use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failures talking to the generative API.
///
/// Nothing here is retried; callers decide whether a failure is fatal.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no API key configured (set api.key, GEMINI_API_KEY or API_KEY)")]
    MissingApiKey,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("API returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response from AI engine: {0}")]
    InvalidResponse(String),

    #[error("no image generated")]
    NoImage,

    #[error("TTS generation failed: response carried no audio")]
    NoAudio,

    #[error("cancelled")]
    Cancelled,
}

impl ServiceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Cancelled)
    }
}
