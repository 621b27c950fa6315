//! Raw PCM16 decoding.
//!
//! Speech comes back from the synthesis service as headerless 16-bit signed
//! little-endian samples. Rate and channel count are never read from the data;
//! the caller supplies them from configuration.

use crate::buffer::DecodedAudioBuffer;
use crate::error::{AudioError, Result};

/// Bytes per 16-bit sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Largest channel count accepted, matching cpal's `ChannelCount`.
pub const MAX_CHANNELS: usize = u16::MAX as usize;

/// Divisor mapping `i16` onto `[-1.0, 1.0)`. `-32768` lands exactly on `-1.0`.
pub const PCM16_SCALE: f32 = 32768.0;

/// Out-of-band description of a headerless PCM16 stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

impl PcmFormat {
    /// Mono 24 kHz, the shape of synthesized speech.
    pub const SPEECH: PcmFormat = PcmFormat {
        sample_rate: 24_000,
        channels: 1,
    };

    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes in one interleaved frame, or `None` if the channel count overflows it.
    pub fn frame_bytes(&self) -> Option<usize> {
        BYTES_PER_SAMPLE.checked_mul(self.channels)
    }

    /// Check the format and return its frame size in bytes.
    fn validate(&self) -> Result<usize> {
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidFormat(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(AudioError::InvalidFormat(
                "channel count must be positive".to_string(),
            ));
        }
        if self.channels > MAX_CHANNELS {
            return Err(AudioError::InvalidFormat(format!(
                "channel count {} exceeds {MAX_CHANNELS}",
                self.channels
            )));
        }
        self.frame_bytes().ok_or_else(|| {
            AudioError::InvalidFormat(format!("channel count {} overflows", self.channels))
        })
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::SPEECH
    }
}

/// Decode interleaved PCM16 LE bytes into a planar buffer.
///
/// `bytes.len()` must be a multiple of `2 * num_channels`; a trailing partial
/// frame is rejected with [`AudioError::MalformedAudio`] and nothing is returned.
/// Each sample becomes `raw as f32 / 32768.0`.
pub fn decode_pcm16le(
    bytes: &[u8],
    sample_rate: u32,
    num_channels: usize,
) -> Result<DecodedAudioBuffer> {
    let format = PcmFormat::new(sample_rate, num_channels);
    let frame_bytes = format.validate()?;
    if bytes.len() % frame_bytes != 0 {
        return Err(AudioError::MalformedAudio {
            expected_multiple: frame_bytes,
            actual_len: bytes.len(),
        });
    }
    decode_whole_frames(bytes, format, frame_bytes)
}

/// Like [`decode_pcm16le`], but silently drops a trailing partial frame.
///
/// Matches the integer-division behaviour of older clients. Not used by default.
pub fn decode_pcm16le_lenient(
    bytes: &[u8],
    sample_rate: u32,
    num_channels: usize,
) -> Result<DecodedAudioBuffer> {
    let format = PcmFormat::new(sample_rate, num_channels);
    let frame_bytes = format.validate()?;
    let dropped = bytes.len() % frame_bytes;
    if dropped != 0 {
        tracing::warn!(
            dropped_bytes = dropped,
            frame_bytes,
            "dropping trailing partial PCM frame"
        );
    }
    decode_whole_frames(&bytes[..bytes.len() - dropped], format, frame_bytes)
}

/// Decode with a [`PcmFormat`] instead of loose arguments.
pub fn decode_with_format(bytes: &[u8], format: PcmFormat) -> Result<DecodedAudioBuffer> {
    decode_pcm16le(bytes, format.sample_rate, format.channels)
}

/// Normalize one raw sample.
#[inline]
pub fn sample_to_f32(raw: i16) -> f32 {
    raw as f32 / PCM16_SCALE
}

// `bytes` holds whole frames only.
fn decode_whole_frames(
    bytes: &[u8],
    format: PcmFormat,
    frame_bytes: usize,
) -> Result<DecodedAudioBuffer> {
    let frame_count = bytes.len() / frame_bytes;

    let mut channels: Vec<Vec<f32>> = (0..format.channels)
        .map(|_| Vec::with_capacity(frame_count))
        .collect();

    for frame in bytes.chunks_exact(frame_bytes) {
        for (ch, sample) in channels.iter_mut().zip(frame.chunks_exact(BYTES_PER_SAMPLE)) {
            ch.push(sample_to_f32(i16::from_le_bytes([sample[0], sample[1]])));
        }
    }

    DecodedAudioBuffer::new(channels, format.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn mono_scenario_decodes_to_expected_values() {
        let bytes = le_bytes(&[0, 16384, -16384, 32767]);
        let buf = decode_pcm16le(&bytes, 24_000, 1).unwrap();
        assert_eq!(buf.frames(), 4);
        assert_eq!(buf.sample_rate(), 24_000);
        assert_eq!(buf.channel(0).unwrap(), &[0.0, 0.5, -0.5, 0.999_969_482_421_875]);
    }

    #[test]
    fn extremes_are_asymmetric() {
        assert_eq!(sample_to_f32(i16::MIN), -1.0);
        assert_eq!(sample_to_f32(i16::MAX), 0.999_969_482_421_875);
        assert!(sample_to_f32(i16::MAX) < 1.0);
    }

    #[test]
    fn every_sample_value_divides_by_32768() {
        for v in (i16::MIN..=i16::MAX).step_by(97).chain([i16::MIN, -1, 0, 1, i16::MAX]) {
            let buf = decode_pcm16le(&v.to_le_bytes(), 24_000, 1).unwrap();
            assert_eq!(buf.channel(0).unwrap()[0], v as f32 / 32768.0, "sample {v}");
        }
    }

    #[test]
    fn three_bytes_mono_is_malformed() {
        let err = decode_pcm16le(&[0, 0, 0], 24_000, 1).unwrap_err();
        assert!(matches!(
            err,
            AudioError::MalformedAudio {
                expected_multiple: 2,
                actual_len: 3
            }
        ));
    }

    #[test]
    fn partial_stereo_frame_is_malformed() {
        // Six bytes is three whole samples but only one and a half stereo frames.
        let bytes = le_bytes(&[1, 2, 3]);
        let err = decode_pcm16le(&bytes, 24_000, 2).unwrap_err();
        assert!(matches!(
            err,
            AudioError::MalformedAudio {
                expected_multiple: 4,
                actual_len: 6
            }
        ));
    }

    #[test]
    fn stereo_is_deinterleaved() {
        let (l0, r0, l1, r1) = (1000i16, -2000i16, 3000i16, -4000i16);
        let bytes = le_bytes(&[l0, r0, l1, r1]);
        let buf = decode_pcm16le(&bytes, 48_000, 2).unwrap();
        assert_eq!(buf.num_channels(), 2);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.channel(0).unwrap(), &[sample_to_f32(l0), sample_to_f32(l1)]);
        assert_eq!(buf.channel(1).unwrap(), &[sample_to_f32(r0), sample_to_f32(r1)]);
    }

    #[test]
    fn frame_count_matches_length() {
        for channels in 1..=4usize {
            for frames in [0usize, 1, 7, 480] {
                let bytes = vec![0u8; 2 * channels * frames];
                let buf = decode_pcm16le(&bytes, 24_000, channels).unwrap();
                assert_eq!(buf.num_channels(), channels);
                for ch in buf.channels() {
                    assert_eq!(ch.len(), frames);
                }
            }
        }
    }

    #[test]
    fn empty_input_decodes_to_empty_channels() {
        let buf = decode_pcm16le(&[], 24_000, 1).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.num_channels(), 1);
    }

    #[test]
    fn zero_rate_or_channels_is_invalid() {
        assert!(matches!(
            decode_pcm16le(&[0, 0], 0, 1),
            Err(AudioError::InvalidFormat(_))
        ));
        assert!(matches!(
            decode_pcm16le(&[0, 0], 24_000, 0),
            Err(AudioError::InvalidFormat(_))
        ));
    }

    #[test]
    fn oversized_channel_count_is_invalid() {
        for channels in [MAX_CHANNELS + 1, 1 << 40, usize::MAX / 2 + 1, usize::MAX] {
            assert!(
                matches!(
                    decode_pcm16le(&[], 24_000, channels),
                    Err(AudioError::InvalidFormat(_))
                ),
                "channels {channels}"
            );
            assert!(matches!(
                decode_pcm16le_lenient(&[0, 0, 0], 24_000, channels),
                Err(AudioError::InvalidFormat(_))
            ));
        }
        assert_eq!(PcmFormat::new(24_000, usize::MAX).frame_bytes(), None);
    }

    #[test]
    fn max_channel_count_is_accepted() {
        let buf = decode_pcm16le(&[], 24_000, MAX_CHANNELS).unwrap();
        assert_eq!(buf.num_channels(), MAX_CHANNELS);
        assert!(buf.is_empty());
    }

    // Older clients truncated via integer division; strict decode rejects instead.
    // The lenient path is kept so parity can be checked explicitly.
    #[test]
    fn lenient_decode_drops_trailing_partial_frame() {
        let mut bytes = le_bytes(&[16384, -16384]);
        bytes.push(0x7f);
        assert!(decode_pcm16le(&bytes, 24_000, 1).is_err());

        let buf = decode_pcm16le_lenient(&bytes, 24_000, 1).unwrap();
        assert_eq!(buf.channel(0).unwrap(), &[0.5, -0.5]);
    }

    #[test]
    fn decode_with_format_uses_speech_default() {
        let buf = decode_with_format(&le_bytes(&[0, 0]), PcmFormat::default()).unwrap();
        assert_eq!(buf.sample_rate(), 24_000);
        assert_eq!(buf.frames(), 2);
        assert_eq!(PcmFormat::SPEECH.frame_bytes(), Some(2));
    }
}
