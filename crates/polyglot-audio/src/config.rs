use std::time::Duration;

use crate::resample::ResampleConfig;

/// Playback tuning shared by the feed, resample and output stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Queue depth per stage, in seconds.
    pub buffer_seconds: f32,
    /// How long a finished source keeps its stream open so the device can flush.
    pub drain_tail: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
            drain_tail: Duration::from_millis(100),
        }
    }
}

impl PlaybackConfig {
    pub fn resample(&self) -> ResampleConfig {
        ResampleConfig {
            chunk_frames: self.chunk_frames,
            buffer_seconds: self.buffer_seconds,
        }
    }
}
