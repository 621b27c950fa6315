//! CPAL output stream for one-shot sources.
//!
//! The real-time callback:
//! - outputs silence without draining anything while the context is suspended
//! - refills a small local buffer from the [`SampleQueue`] without blocking
//! - maps source channels onto device channels (mono↔stereo, clamp otherwise)
//! - converts `f32` to the device sample format

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::DeviceTrait;

use crate::error::{AudioError, Result};
use crate::queue::{PopStrategy, SampleQueue};

/// Shared knobs for one output stream.
#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Max frames pulled from the queue per refill.
    pub refill_max_frames: usize,
    /// Context-wide suspend flag; when set the callback emits silence.
    pub suspended: Arc<AtomicBool>,
    /// Incremented by the number of source frames written.
    pub played_frames: Arc<AtomicU64>,
}

/// Build (but do not start) an output stream that plays `queue`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    opts: StreamOptions,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, opts),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, opts),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, opts),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, opts),
        other => Err(AudioError::PlaybackUnavailable(format!(
            "unsupported sample format: {other:?}"
        ))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    opts: StreamOptions,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let dst_channels = config.channels as usize;
    let refill_max_frames = opts.refill_max_frames.max(1);
    let source = Arc::new(Mutex::new(LocalSource::new(queue.channels())));
    let queue = queue.clone();
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                if opts.suspended.load(Ordering::Relaxed) {
                    data.fill(silence);
                    return;
                }
                let Ok(mut src) = source.lock() else {
                    data.fill(silence);
                    return;
                };

                let mut written = 0u64;
                for frame in data.chunks_mut(dst_channels) {
                    if src.is_exhausted() {
                        match queue.pop(PopStrategy::NonBlocking {
                            max_frames: refill_max_frames,
                        }) {
                            Some(samples) => src.refill(samples),
                            None => {
                                frame.fill(silence);
                                continue;
                            }
                        }
                    }
                    for (ch, out) in frame.iter_mut().enumerate() {
                        let sample = src.mapped(ch, dst_channels);
                        *out = <T as cpal::Sample>::from_sample::<f32>(sample);
                    }
                    src.advance();
                    written += 1;
                }

                if written > 0 {
                    opts.played_frames.fetch_add(written, Ordering::Relaxed);
                }
            },
            |err| tracing::warn!("output stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::unavailable("build output stream", e))?;

    Ok(stream)
}

/// Interleaved samples fetched from the queue, consumed frame by frame.
struct LocalSource {
    channels: usize,
    samples: Vec<f32>,
    pos: usize,
}

impl LocalSource {
    fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            samples: Vec::new(),
            pos: 0,
        }
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.samples.len()
    }

    fn refill(&mut self, samples: Vec<f32>) {
        self.samples = samples;
        self.pos = 0;
    }

    fn advance(&mut self) {
        self.pos += self.channels;
    }

    /// Sample for device channel `dst_ch` from the current source frame.
    fn mapped(&self, dst_ch: usize, dst_channels: usize) -> f32 {
        map_channel(
            &self.samples[self.pos..(self.pos + self.channels).min(self.samples.len())],
            dst_ch,
            dst_channels,
        )
    }
}

/// Channel mapping for one frame:
/// - mono → any: duplicate
/// - stereo → mono: average
/// - otherwise: same index, clamped to the last source channel
fn map_channel(frame: &[f32], dst_ch: usize, dst_channels: usize) -> f32 {
    let get = |ch: usize| frame.get(ch).copied().unwrap_or(0.0);
    match (frame.len(), dst_channels) {
        (0, _) => 0.0,
        (1, _) => get(0),
        (2, 1) => 0.5 * (get(0) + get(1)),
        (n, _) => get(dst_ch.min(n - 1)),
    }
}
