//! Output contexts and one-shot playback.
//!
//! An [`AudioOutput`] is the device context every play request goes through. It is
//! created once (lazily, by [`crate::session::OutputSession`]) and reused; each
//! [`AudioOutput::start`] call plays one decoded buffer as an independent source.
//! Overlapping sources are allowed and are not mixed down or queued.
//!
//! `start` returns once the source is *playing*. Completion is reported through
//! the returned [`PlaybackHandle`], which callers are free to ignore.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::buffer::DecodedAudioBuffer;
use crate::config::PlaybackConfig;
use crate::device;
use crate::error::{AudioError, Result};
use crate::playback::{StreamOptions, build_output_stream};
use crate::queue::{SampleQueue, start_buffer_feed};
use crate::resample::start_resampler;

/// Power/policy state of an output context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputState {
    Running,
    /// Sources are held silent until the context is resumed.
    Suspended,
    /// Disposed; every further operation fails with `PlaybackUnavailable`.
    Closed,
}

/// A device context able to start one-shot sources.
pub trait AudioOutput: Send + Sync {
    fn state(&self) -> OutputState;

    /// Resume a suspended context. No-op when already running.
    fn resume(&self) -> Result<()>;

    fn suspend(&self) -> Result<()>;

    /// Dispose the context. Sources already playing are stopped and report
    /// [`PlaybackEnd::Stopped`].
    fn close(&self);

    /// Rate the context was opened at.
    fn sample_rate(&self) -> u32;

    /// Start playing `buffer` as a new independent source.
    fn start(&self, buffer: DecodedAudioBuffer) -> Result<PlaybackHandle>;
}

/// Creates output contexts on demand.
pub trait OutputFactory: Send + Sync {
    type Output: AudioOutput;

    fn create(&self, preferred_sample_rate: u32) -> Result<Self::Output>;
}

/// How a source ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// Every frame was handed to the device.
    Drained,
    /// [`PlaybackHandle::stop`] was called or the context was closed first.
    Stopped,
    Failed(String),
}

/// Observer for one playing source.
///
/// Dropping the handle does not stop playback.
#[derive(Debug)]
pub struct PlaybackHandle {
    frames: usize,
    sample_rate: u32,
    stop: Arc<AtomicBool>,
    played_frames: Arc<AtomicU64>,
    finished: Receiver<PlaybackEnd>,
    outcome: OnceLock<PlaybackEnd>,
}

/// Producer side of a [`PlaybackHandle`], held by whatever drives the source.
#[derive(Debug)]
pub struct FinishSignal {
    tx: Sender<PlaybackEnd>,
    stop: Arc<AtomicBool>,
    played_frames: Arc<AtomicU64>,
}

impl PlaybackHandle {
    /// Create a handle for a source of `frames` frames at `sample_rate`.
    ///
    /// Output implementations keep the [`FinishSignal`] and call
    /// [`FinishSignal::finish`] when the source ends.
    pub fn new(frames: usize, sample_rate: u32) -> (Self, FinishSignal) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));
        let played_frames = Arc::new(AtomicU64::new(0));
        let handle = Self {
            frames,
            sample_rate,
            stop: stop.clone(),
            played_frames: played_frames.clone(),
            finished: rx,
            outcome: OnceLock::new(),
        };
        let signal = FinishSignal {
            tx,
            stop,
            played_frames,
        };
        (handle, signal)
    }

    /// Source length in frames (at the source rate).
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }

    /// Frames written to the device so far (at the device rate).
    pub fn played_frames(&self) -> u64 {
        self.played_frames.load(Ordering::Relaxed)
    }

    /// Ask the source to stop early.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Non-blocking check for completion.
    pub fn try_finished(&self) -> Option<PlaybackEnd> {
        if let Some(end) = self.outcome.get() {
            return Some(end.clone());
        }
        let end = match self.finished.try_recv() {
            Ok(end) => end,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => lost_signal(),
        };
        Some(self.outcome.get_or_init(|| end).clone())
    }

    /// Block until the source ends.
    pub fn wait_finished(&self) -> PlaybackEnd {
        if let Some(end) = self.outcome.get() {
            return end.clone();
        }
        let end = self.finished.recv().unwrap_or_else(|_| lost_signal());
        self.outcome.get_or_init(|| end).clone()
    }

    /// Block up to `timeout`; `None` if the source is still playing.
    pub fn wait_finished_timeout(&self, timeout: Duration) -> Option<PlaybackEnd> {
        if let Some(end) = self.outcome.get() {
            return Some(end.clone());
        }
        let end = match self.finished.recv_timeout(timeout) {
            Ok(end) => end,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => lost_signal(),
        };
        Some(self.outcome.get_or_init(|| end).clone())
    }
}

fn lost_signal() -> PlaybackEnd {
    PlaybackEnd::Failed("playback ended without reporting".to_string())
}

impl FinishSignal {
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn stop_flag(&self) -> &Arc<AtomicBool> {
        &self.stop
    }

    pub fn played_frames(&self) -> &Arc<AtomicU64> {
        &self.played_frames
    }

    pub fn finish(self, end: PlaybackEnd) {
        let _ = self.tx.send(end);
    }
}

/// Builds [`CpalOutput`] contexts on the host default (or a named) device.
#[derive(Clone, Debug, Default)]
pub struct CpalOutputFactory {
    /// Case-insensitive substring of the device name; `None` uses the default device.
    pub device: Option<String>,
    pub playback: PlaybackConfig,
}

impl CpalOutputFactory {
    pub fn new(device: Option<String>, playback: PlaybackConfig) -> Self {
        Self { device, playback }
    }
}

impl OutputFactory for CpalOutputFactory {
    type Output = CpalOutput;

    fn create(&self, preferred_sample_rate: u32) -> Result<CpalOutput> {
        CpalOutput::open(self.device.clone(), preferred_sample_rate, self.playback.clone())
    }
}

/// Output context backed by a CPAL device.
///
/// The device and stream config are resolved once; every source opens its own
/// stream on a dedicated thread that owns it until the source ends.
pub struct CpalOutput {
    device_name: Option<String>,
    device_label: String,
    supported: cpal::SupportedStreamConfig,
    stream_config: cpal::StreamConfig,
    playback: PlaybackConfig,
    suspended: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl CpalOutput {
    pub fn open(
        device_name: Option<String>,
        preferred_sample_rate: u32,
        playback: PlaybackConfig,
    ) -> Result<Self> {
        use cpal::traits::DeviceTrait;

        let host = cpal::default_host();
        let device = device::pick_device(&host, device_name.as_deref())?;
        let device_label = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let supported = device::pick_output_config(&device, preferred_sample_rate)?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported) {
            stream_config.buffer_size = buf;
        }
        tracing::info!(
            device = %device_label,
            preferred_rate_hz = preferred_sample_rate,
            output_rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            format = ?supported.sample_format(),
            buffer_size = ?stream_config.buffer_size,
            "output context opened"
        );

        Ok(Self {
            device_name,
            device_label,
            supported,
            stream_config,
            playback,
            suspended: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(AudioError::PlaybackUnavailable(
                "output context is closed".to_string(),
            ));
        }
        Ok(())
    }
}

impl AudioOutput for CpalOutput {
    fn state(&self) -> OutputState {
        if self.closed.load(Ordering::Relaxed) {
            OutputState::Closed
        } else if self.suspended.load(Ordering::Relaxed) {
            OutputState::Suspended
        } else {
            OutputState::Running
        }
    }

    fn resume(&self) -> Result<()> {
        self.ensure_open()?;
        if self.suspended.swap(false, Ordering::Relaxed) {
            tracing::debug!(device = %self.device_label, "output context resumed");
        }
        Ok(())
    }

    fn suspend(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.suspended.swap(true, Ordering::Relaxed) {
            tracing::debug!(device = %self.device_label, "output context suspended");
        }
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::Relaxed) {
            self.suspended.store(true, Ordering::Relaxed);
            tracing::debug!(device = %self.device_label, "output context closed");
        }
    }

    fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate
    }

    fn start(&self, buffer: DecodedAudioBuffer) -> Result<PlaybackHandle> {
        self.ensure_open()?;
        let (handle, signal) = PlaybackHandle::new(buffer.frames(), buffer.sample_rate());
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let job = OneShot {
            device_name: self.device_name.clone(),
            sample_format: self.supported.sample_format(),
            stream_config: self.stream_config.clone(),
            playback: self.playback.clone(),
            suspended: self.suspended.clone(),
            closed: self.closed.clone(),
        };

        thread::Builder::new()
            .name("polyglot-playback".to_string())
            .spawn(move || job.run(buffer, started_tx, signal))
            .map_err(|e| AudioError::unavailable("spawn playback thread", e))?;

        match started_rx.recv() {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::PlaybackUnavailable(
                "playback thread exited before starting".to_string(),
            )),
        }
    }
}

/// Everything a playback thread needs to open its own stream.
struct OneShot {
    device_name: Option<String>,
    sample_format: cpal::SampleFormat,
    stream_config: cpal::StreamConfig,
    playback: PlaybackConfig,
    suspended: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl OneShot {
    fn run(self, buffer: DecodedAudioBuffer, started: Sender<Result<()>>, signal: FinishSignal) {
        let frames = buffer.frames();
        let (stream, srcq, outq) = match self.open(buffer, &signal) {
            Ok(parts) => parts,
            Err(e) => {
                let msg = e.to_string();
                let _ = started.send(Err(e));
                signal.finish(PlaybackEnd::Failed(msg));
                return;
            }
        };
        let _ = started.send(Ok(()));
        tracing::debug!(frames, "source started");

        let tail = self.playback.drain_tail;
        let end = wait_for_source_end(&srcq, &outq, &signal, &self.closed, tail);
        drop(stream);

        tracing::debug!(frames, ?end, "source finished");
        signal.finish(end);
    }

    fn open(
        &self,
        buffer: DecodedAudioBuffer,
        signal: &FinishSignal,
    ) -> Result<(cpal::Stream, Arc<SampleQueue>, Arc<SampleQueue>)> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.device_name.as_deref())?;

        let src_rate = buffer.sample_rate();
        let dst_rate = self.stream_config.sample_rate;
        let srcq = start_buffer_feed(buffer, self.playback.buffer_seconds);

        let wired = (|| {
            let outq = if src_rate == dst_rate {
                srcq.clone()
            } else {
                tracing::debug!(src_rate, dst_rate, "resampling source");
                start_resampler(srcq.clone(), src_rate, dst_rate, self.playback.resample())?
            };
            let stream = build_output_stream(
                &device,
                &self.stream_config,
                self.sample_format,
                &outq,
                StreamOptions {
                    refill_max_frames: self.playback.refill_max_frames,
                    suspended: self.suspended.clone(),
                    played_frames: signal.played_frames().clone(),
                },
            )?;
            stream
                .play()
                .map_err(|e| AudioError::unavailable("start output stream", e))?;
            Ok((stream, outq))
        })();

        match wired {
            Ok((stream, outq)) => Ok((stream, srcq, outq)),
            Err(e) => {
                srcq.close();
                Err(e)
            }
        }
    }
}

/// Wait until `outq` drains, the handle asks to stop, or the context is closed.
///
/// A drained source keeps its stream for `drain_tail` so the device can flush.
/// Otherwise both queues are closed so the feed and resampler threads exit.
fn wait_for_source_end(
    srcq: &SampleQueue,
    outq: &SampleQueue,
    signal: &FinishSignal,
    closed: &AtomicBool,
    drain_tail: Duration,
) -> PlaybackEnd {
    if outq.wait_drained(&[signal.stop_flag(), closed]) {
        thread::sleep(drain_tail);
        return PlaybackEnd::Drained;
    }
    srcq.close();
    outq.close();
    PlaybackEnd::Stopped
}
