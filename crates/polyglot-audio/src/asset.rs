//! Whole-file decoding of audio assets (WAV, FLAC, MP3, ...) via Symphonia.
//!
//! Unlike the raw PCM decoder, assets carry their own format header, so rate and
//! channel layout come from the container. The whole asset is decoded up front
//! into a [`DecodedAudioBuffer`]; assets are short promo clips, not albums.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSource, MediaSourceStream},
    meta::MetadataOptions,
    probe::Hint,
};

use crate::buffer::DecodedAudioBuffer;
use crate::error::{AudioError, Result};

/// Container/codec facts reported alongside a decoded asset.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetInfo {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: usize,
    pub bits_per_sample: Option<u32>,
    pub duration: Duration,
}

#[derive(Clone, Debug)]
pub struct AudioAsset {
    pub buffer: DecodedAudioBuffer,
    pub info: AssetInfo,
}

/// Decode the audio file at `path`, using its extension as a probe hint.
pub fn decode_file(path: &Path) -> Result<AudioAsset> {
    let file = File::open(path)?;
    let ext = path.extension().and_then(|e| e.to_str());
    decode_source(Box::new(file), ext)
}

/// Decode an in-memory asset (e.g. an uploaded file).
pub fn decode_bytes(bytes: Vec<u8>, extension_hint: Option<&str>) -> Result<AudioAsset> {
    decode_source(Box::new(Cursor::new(bytes)), extension_hint)
}

fn decode_source(source: Box<dyn MediaSource>, extension_hint: Option<&str>) -> Result<AudioAsset> {
    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| asset_error("probe", e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Asset("no audio track".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let codec = symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|d| d.short_name.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| asset_error("open decoder", e))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut spec = None;
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(asset_error("read packet", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                skipped += 1;
                tracing::debug!("skipping undecodable packet: {msg}");
                continue;
            }
            Err(e) => return Err(asset_error("decode", e)),
        };

        let packet_spec = *decoded.spec();
        spec.get_or_insert(packet_spec);
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, packet_spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if skipped > 0 {
        tracing::warn!(skipped, "asset had undecodable packets");
    }

    let (sample_rate, channels) = match spec {
        Some(s) => (s.rate, s.channels.count()),
        None => (
            params
                .sample_rate
                .ok_or_else(|| AudioError::Asset("unknown sample rate".to_string()))?,
            params.channels.map(|c| c.count()).unwrap_or(1),
        ),
    };

    let buffer = DecodedAudioBuffer::from_interleaved(&samples, channels, sample_rate)?;
    let info = AssetInfo {
        codec,
        sample_rate,
        channels,
        bits_per_sample: params.bits_per_sample,
        duration: buffer.duration(),
    };
    tracing::debug!(
        codec = %info.codec,
        rate_hz = info.sample_rate,
        channels = info.channels,
        frames = buffer.frames(),
        "asset decoded"
    );
    Ok(AudioAsset { buffer, info })
}

fn asset_error(what: &str, err: SymphoniaError) -> AudioError {
    AudioError::Asset(format!("{what}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_pcm16(rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_stereo_wav_from_memory() {
        let mut samples = Vec::new();
        for _ in 0..1000 {
            samples.push(16384);
            samples.push(-16384);
        }
        let asset = decode_bytes(wav_pcm16(8000, 2, &samples), Some("wav")).unwrap();

        assert_eq!(asset.info.sample_rate, 8000);
        assert_eq!(asset.info.channels, 2);
        assert_eq!(asset.info.bits_per_sample, Some(16));
        assert_eq!(asset.buffer.frames(), 1000);
        let left = asset.buffer.channel(0).unwrap();
        let right = asset.buffer.channel(1).unwrap();
        assert!((left[10] - 0.5).abs() < 1e-3);
        assert!((right[10] + 0.5).abs() < 1e-3);
        assert!((asset.info.duration.as_secs_f64() - 0.125).abs() < 1e-6);
    }

    #[test]
    fn garbage_is_an_asset_error() {
        let err = decode_bytes(vec![0x13; 64], None).unwrap_err();
        assert!(matches!(err, AudioError::Asset(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = decode_file(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, AudioError::Io(_)));
    }
}
