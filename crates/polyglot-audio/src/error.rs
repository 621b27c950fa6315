//! Error types for the audio pipeline.

use thiserror::Error;

/// Result alias used across the audio crate.
pub type Result<T> = std::result::Result<T, AudioError>;

#[derive(Debug, Error)]
pub enum AudioError {
    /// Byte length is not a whole number of frames.
    #[error(
        "malformed PCM: expected a multiple of {expected_multiple} bytes, got {actual_len} ({} trailing)",
        .actual_len % .expected_multiple
    )]
    MalformedAudio {
        expected_multiple: usize,
        actual_len: usize,
    },

    /// Sample rate, channel count, or buffer shape is unusable.
    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    /// The output context could not be created, resumed, or used.
    #[error("playback unavailable: {0}")]
    PlaybackUnavailable(String),

    /// An audio asset (wav/flac/mp3/...) failed to probe or decode.
    #[error("asset decode error: {0}")]
    Asset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AudioError {
    pub(crate) fn unavailable(what: &str, err: impl std::fmt::Display) -> Self {
        AudioError::PlaybackUnavailable(format!("{what}: {err}"))
    }

    /// True for failures of the output side (device, stream, context state).
    pub fn is_playback_unavailable(&self) -> bool {
        matches!(self, AudioError::PlaybackUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_message_states_expected_and_actual() {
        let err = AudioError::MalformedAudio {
            expected_multiple: 4,
            actual_len: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("multiple of 4"));
        assert!(msg.contains("got 10"));
        assert!(msg.contains("2 trailing"));
    }

    #[test]
    fn unavailable_helper_keeps_context() {
        let err = AudioError::unavailable("open device", "no such device");
        assert!(err.is_playback_unavailable());
        assert_eq!(
            err.to_string(),
            "playback unavailable: open device: no such device"
        );
    }
}
