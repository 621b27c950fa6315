//! Sample-rate conversion between a decoded buffer and the output device.
//!
//! Speech arrives at 24 kHz; many devices only open at 44.1/48 kHz. When the rates
//! differ, a background thread runs Rubato's sinc resampler between two
//! [`SampleQueue`]s.

use std::sync::Arc;
use std::thread;

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::error::{AudioError, Result};
use crate::queue::{PopStrategy, SampleQueue, capacity_samples};

/// Tuning for the resampler stage.
#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input frames per resampler call.
    pub chunk_frames: usize,
    /// Output queue depth in seconds.
    pub buffer_seconds: f32,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            buffer_seconds: 2.0,
        }
    }
}

/// Expected output length for `frames` input frames, ignoring filter delay.
pub fn expected_output_frames(frames: usize, src_rate: u32, dst_rate: u32) -> usize {
    if src_rate == 0 {
        return 0;
    }
    ((frames as u128 * dst_rate as u128) / src_rate as u128) as usize
}

/// Spawn a resampler converting `srcq` (at `src_rate`) into a new queue at `dst_rate`.
///
/// The returned queue is closed once `srcq` is closed and drained, or on a
/// resampler error (logged).
pub fn start_resampler(
    srcq: Arc<SampleQueue>,
    src_rate: u32,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<Arc<SampleQueue>> {
    if src_rate == 0 || dst_rate == 0 {
        return Err(AudioError::InvalidFormat(format!(
            "cannot resample {src_rate} Hz -> {dst_rate} Hz"
        )));
    }
    let channels = srcq.channels();
    let chunk_frames = cfg.chunk_frames.max(1);
    let dstq = Arc::new(SampleQueue::new(
        channels,
        capacity_samples(dst_rate, channels, cfg.buffer_seconds),
    ));

    let window = WindowFunction::BlackmanHarris2;
    let sinc_len = 128;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let ratio = dst_rate as f64 / src_rate as f64;

    tracing::debug!(src_rate, dst_rate, channels, chunk_frames, "resampler started");

    let out = dstq.clone();
    thread::spawn(move || {
        let resampler = match Async::<f32>::new_sinc(
            ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        ) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("resampler init: {e:#}");
                srcq.close();
                out.close();
                return;
            }
        };
        let mut stage = ResampleStage {
            resampler: Box::new(resampler),
            channels,
            scratch: Vec::new(),
        };
        while let Some(chunk) = srcq.pop(PopStrategy::BlockingExact { frames: chunk_frames }) {
            if !stage.process(&chunk, None, &out) {
                out.close();
                return;
            }
        }
        // Whatever is left is shorter than a full chunk.
        while let Some(tail) = srcq.pop(PopStrategy::BlockingUpTo { max_frames: chunk_frames }) {
            let frames = tail.len() / channels;
            let mut padded = tail;
            padded.resize(chunk_frames * channels, 0.0);
            if !stage.process(&padded, Some(frames), &out) {
                break;
            }
        }
        out.close();
    });

    Ok(dstq)
}

struct ResampleStage {
    resampler: Box<dyn Resampler<f32>>,
    channels: usize,
    scratch: Vec<f32>,
}

impl ResampleStage {
    /// Resample one input chunk and push the result; `false` stops the stage.
    fn process(&mut self, input: &[f32], partial_len: Option<usize>, out: &SampleQueue) -> bool {
        let in_frames = input.len() / self.channels;
        let out_capacity = self.resampler.output_frames_max();
        self.scratch.resize(out_capacity * self.channels, 0.0);

        let input_adapter = match InterleavedSlice::new(input, self.channels, in_frames) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!("resampler input adapter: {e:#}");
                return false;
            }
        };
        let mut output_adapter =
            match InterleavedSlice::new_mut(&mut self.scratch, self.channels, out_capacity) {
                Ok(a) => a,
                Err(e) => {
                    tracing::error!("resampler output adapter: {e:#}");
                    return false;
                }
            };
        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len,
        };

        match self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
        {
            Ok((_consumed, produced)) => {
                produced == 0 || out.push_blocking(&self.scratch[..produced * self.channels])
            }
            Err(e) => {
                tracing::error!("resampler process: {e:#}");
                false
            }
        }
    }
}
