//! Shared playback session: one lazily created output context per application.

use std::sync::{Arc, Mutex};

use crate::buffer::DecodedAudioBuffer;
use crate::error::{AudioError, Result};
use crate::output::{AudioOutput, OutputFactory, OutputState, PlaybackHandle};
use crate::pcm::{PcmFormat, decode_with_format};

/// Owns the output context for an application and hands it to play requests.
///
/// The context is created on first use through the factory and then reused for
/// the lifetime of the session. Creation is mutex-guarded, so concurrent first
/// callers still end up sharing a single context.
pub struct OutputSession<F: OutputFactory> {
    factory: F,
    preferred_sample_rate: u32,
    context: Mutex<Option<Arc<F::Output>>>,
}

impl<F: OutputFactory> OutputSession<F> {
    pub fn new(factory: F, preferred_sample_rate: u32) -> Self {
        Self {
            factory,
            preferred_sample_rate,
            context: Mutex::new(None),
        }
    }

    pub fn preferred_sample_rate(&self) -> u32 {
        self.preferred_sample_rate
    }

    /// Return the cached context, creating it for `preferred_sample_rate` if needed.
    pub fn ensure_context(&self, preferred_sample_rate: u32) -> Result<Arc<F::Output>> {
        let mut slot = self.context.lock().map_err(|_| {
            AudioError::PlaybackUnavailable("output session lock poisoned".to_string())
        })?;
        if let Some(ctx) = slot.as_ref() {
            return Ok(ctx.clone());
        }
        let ctx = Arc::new(self.factory.create(preferred_sample_rate)?);
        tracing::debug!(preferred_sample_rate, "output context created");
        *slot = Some(ctx.clone());
        Ok(ctx)
    }

    /// The context, if one has been created.
    pub fn context(&self) -> Option<Arc<F::Output>> {
        self.context.lock().ok().and_then(|slot| slot.clone())
    }

    /// Play `buffer` on the session context (created on demand).
    pub fn play(&self, buffer: DecodedAudioBuffer) -> Result<PlaybackHandle> {
        let ctx = self.ensure_context(self.preferred_sample_rate)?;
        play(buffer, ctx.as_ref())
    }

    /// Decode headerless PCM16 and play it.
    pub fn decode_and_play(&self, bytes: &[u8], format: PcmFormat) -> Result<PlaybackHandle> {
        let buffer = decode_with_format(bytes, format)?;
        self.play(buffer)
    }
}

/// Start one-shot playback of `buffer` on `context`, resuming it first if suspended.
///
/// Returns once the source has started.
pub fn play<O: AudioOutput + ?Sized>(
    buffer: DecodedAudioBuffer,
    context: &O,
) -> Result<PlaybackHandle> {
    match context.state() {
        OutputState::Closed => {
            return Err(AudioError::PlaybackUnavailable(
                "output context is closed".to_string(),
            ));
        }
        OutputState::Suspended => {
            tracing::debug!("resuming suspended output context before playback");
            context.resume()?;
        }
        OutputState::Running => {}
    }
    tracing::debug!(
        frames = buffer.frames(),
        channels = buffer.num_channels(),
        rate_hz = buffer.sample_rate(),
        "starting one-shot source"
    );
    context.start(buffer)
}
