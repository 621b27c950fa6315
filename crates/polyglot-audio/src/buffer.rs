//! Decoded, planar audio ready for playback.

use std::time::Duration;

use crate::error::{AudioError, Result};

/// Planar `f32` audio: one sample vector per channel, all of equal length.
///
/// Samples are normalized to `[-1.0, 1.0]`. A buffer is produced once per decode
/// and moved into the playback call that consumes it.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl DecodedAudioBuffer {
    /// Build a buffer from per-channel sample vectors.
    ///
    /// Fails if there are no channels, the rate is zero, or channel lengths differ.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(AudioError::InvalidFormat(
                "buffer needs at least one channel".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(AudioError::InvalidFormat(
                "sample rate must be positive".to_string(),
            ));
        }
        let frames = channels[0].len();
        if let Some((idx, ch)) = channels.iter().enumerate().find(|(_, c)| c.len() != frames) {
            return Err(AudioError::InvalidFormat(format!(
                "channel {idx} has {} frames, expected {frames}",
                ch.len()
            )));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// De-interleave `samples` (`L0 R0 L1 R1 ...`) into a planar buffer.
    pub fn from_interleaved(
        samples: &[f32],
        num_channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if num_channels == 0 {
            return Err(AudioError::InvalidFormat(
                "channel count must be positive".to_string(),
            ));
        }
        if samples.len() % num_channels != 0 {
            return Err(AudioError::InvalidFormat(format!(
                "{} interleaved samples do not divide into {num_channels} channels",
                samples.len()
            )));
        }
        let frames = samples.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self::new(channels, sample_rate)
    }

    /// A buffer of `frames` zero samples per channel.
    pub fn silent(num_channels: usize, frames: usize, sample_rate: u32) -> Result<Self> {
        Self::new(vec![vec![0.0; frames]; num_channels], sample_rate)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn channel(&self, idx: usize) -> Option<&[f32]> {
        self.channels.get(idx).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Re-interleave into `frame0[ch0], frame0[ch1], ...` order for output stages.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.num_channels());
        for i in 0..frames {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    /// Largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_ragged_channels() {
        let err = DecodedAudioBuffer::new(vec![vec![0.0; 3], vec![0.0; 2]], 24_000).unwrap_err();
        assert!(matches!(err, AudioError::InvalidFormat(_)));
    }

    #[test]
    fn new_rejects_zero_rate_and_no_channels() {
        assert!(DecodedAudioBuffer::new(vec![vec![0.0]], 0).is_err());
        assert!(DecodedAudioBuffer::new(Vec::new(), 24_000).is_err());
    }

    #[test]
    fn from_interleaved_splits_channels() {
        let buf = DecodedAudioBuffer::from_interleaved(&[0.1, 0.2, 0.3, 0.4], 2, 48_000).unwrap();
        assert_eq!(buf.channel(0).unwrap(), &[0.1, 0.3]);
        assert_eq!(buf.channel(1).unwrap(), &[0.2, 0.4]);
        assert_eq!(buf.to_interleaved(), vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn duration_follows_rate() {
        let buf = DecodedAudioBuffer::silent(1, 12_000, 24_000).unwrap();
        assert_eq!(buf.duration(), Duration::from_millis(500));
        assert!(!buf.is_empty());
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn empty_buffer_has_zero_frames() {
        let buf = DecodedAudioBuffer::silent(2, 0, 24_000).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.duration(), Duration::ZERO);
        assert!(buf.to_interleaved().is_empty());
    }
}
