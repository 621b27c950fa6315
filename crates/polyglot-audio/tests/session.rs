use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use polyglot_audio::{
    AudioError, AudioOutput, DecodedAudioBuffer, OutputFactory, OutputSession, OutputState,
    PcmFormat, PlaybackEnd, PlaybackHandle, play,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Resume,
    Start { frames: usize, rate: u32 },
}

/// Records calls; finishes sources immediately.
#[derive(Default)]
struct FakeOutput {
    suspended: AtomicBool,
    closed: AtomicBool,
    fail_resume: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeOutput {
    fn suspended() -> Self {
        let out = Self::default();
        out.suspended.store(true, Ordering::SeqCst);
        out
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl AudioOutput for FakeOutput {
    fn state(&self) -> OutputState {
        if self.closed.load(Ordering::SeqCst) {
            OutputState::Closed
        } else if self.suspended.load(Ordering::SeqCst) {
            OutputState::Suspended
        } else {
            OutputState::Running
        }
    }

    fn resume(&self) -> polyglot_audio::Result<()> {
        self.calls.lock().unwrap().push(Call::Resume);
        if self.fail_resume {
            return Err(AudioError::PlaybackUnavailable("resume refused".into()));
        }
        self.suspended.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn suspend(&self) -> polyglot_audio::Result<()> {
        self.suspended.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn sample_rate(&self) -> u32 {
        24_000
    }

    fn start(&self, buffer: DecodedAudioBuffer) -> polyglot_audio::Result<PlaybackHandle> {
        self.calls.lock().unwrap().push(Call::Start {
            frames: buffer.frames(),
            rate: buffer.sample_rate(),
        });
        let (handle, signal) = PlaybackHandle::new(buffer.frames(), buffer.sample_rate());
        signal.finish(PlaybackEnd::Drained);
        Ok(handle)
    }
}

#[derive(Clone, Default)]
struct CountingFactory {
    created: Arc<AtomicUsize>,
    rates: Arc<Mutex<Vec<u32>>>,
}

impl OutputFactory for CountingFactory {
    type Output = FakeOutput;

    fn create(&self, preferred_sample_rate: u32) -> polyglot_audio::Result<FakeOutput> {
        // Widen the race window for concurrent first callers.
        thread::sleep(Duration::from_millis(5));
        self.created.fetch_add(1, Ordering::SeqCst);
        self.rates.lock().unwrap().push(preferred_sample_rate);
        Ok(FakeOutput::default())
    }
}

struct NoDeviceFactory;

impl OutputFactory for NoDeviceFactory {
    type Output = FakeOutput;

    fn create(&self, _preferred_sample_rate: u32) -> polyglot_audio::Result<FakeOutput> {
        Err(AudioError::PlaybackUnavailable("no default output device".into()))
    }
}

#[test]
fn context_is_created_once_across_repeated_calls() {
    let factory = CountingFactory::default();
    let session = OutputSession::new(factory.clone(), 24_000);
    assert!(session.context().is_none());

    let a = session.ensure_context(24_000).unwrap();
    let b = session.ensure_context(24_000).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(*factory.rates.lock().unwrap(), vec![24_000]);
}

#[test]
fn concurrent_first_callers_share_one_context() {
    let factory = CountingFactory::default();
    let session = Arc::new(OutputSession::new(factory.clone(), 24_000));
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let session = session.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                session.ensure_context(24_000).unwrap()
            })
        })
        .collect();
    let contexts: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert!(contexts.iter().all(|c| Arc::ptr_eq(c, &contexts[0])));
}

#[test]
fn suspended_context_is_resumed_before_start() {
    let ctx = FakeOutput::suspended();
    let buffer = DecodedAudioBuffer::silent(1, 480, 24_000).unwrap();

    let handle = play(buffer, &ctx).unwrap();

    assert_eq!(
        ctx.calls(),
        vec![Call::Resume, Call::Start { frames: 480, rate: 24_000 }]
    );
    assert_eq!(ctx.state(), OutputState::Running);
    assert_eq!(handle.wait_finished(), PlaybackEnd::Drained);
}

#[test]
fn running_context_is_not_resumed() {
    let ctx = FakeOutput::default();
    play(DecodedAudioBuffer::silent(1, 1, 24_000).unwrap(), &ctx).unwrap();
    assert_eq!(ctx.calls(), vec![Call::Start { frames: 1, rate: 24_000 }]);
}

#[test]
fn failed_resume_means_no_start() {
    let ctx = FakeOutput {
        fail_resume: true,
        ..FakeOutput::suspended()
    };
    let err = play(DecodedAudioBuffer::silent(1, 10, 24_000).unwrap(), &ctx).unwrap_err();
    assert!(err.is_playback_unavailable());
    assert_eq!(ctx.calls(), vec![Call::Resume]);
}

#[test]
fn closed_context_is_unavailable() {
    let ctx = FakeOutput::default();
    ctx.close();
    let err = play(DecodedAudioBuffer::silent(1, 10, 24_000).unwrap(), &ctx).unwrap_err();
    assert!(matches!(err, AudioError::PlaybackUnavailable(_)));
    assert!(ctx.calls().is_empty());
}

#[test]
fn zero_length_buffer_resumes_starts_and_finishes() {
    let factory = CountingFactory::default();
    let session = OutputSession::new(factory, 24_000);
    let ctx = session.ensure_context(24_000).unwrap();
    ctx.suspend().unwrap();

    let handle = session.decode_and_play(&[], PcmFormat::SPEECH).unwrap();

    assert_eq!(
        ctx.calls(),
        vec![Call::Resume, Call::Start { frames: 0, rate: 24_000 }]
    );
    assert_eq!(
        handle.wait_finished_timeout(Duration::from_secs(1)),
        Some(PlaybackEnd::Drained)
    );
}

#[test]
fn malformed_bytes_never_reach_the_output() {
    let factory = CountingFactory::default();
    let session = OutputSession::new(factory.clone(), 24_000);

    let err = session
        .decode_and_play(&[0x00, 0x01, 0x02], PcmFormat::SPEECH)
        .unwrap_err();

    assert!(matches!(
        err,
        AudioError::MalformedAudio { expected_multiple: 2, actual_len: 3 }
    ));
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_device_surfaces_as_playback_unavailable() {
    let session = OutputSession::new(NoDeviceFactory, 24_000);
    let err = session
        .play(DecodedAudioBuffer::silent(1, 10, 24_000).unwrap())
        .unwrap_err();
    assert!(err.is_playback_unavailable());
    assert!(session.context().is_none());
}

#[test]
fn decoded_speech_is_played_as_decoded() {
    let factory = CountingFactory::default();
    let session = OutputSession::new(factory, 24_000);
    let bytes: Vec<u8> = [0i16, 16384, -16384, 32767]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();

    session.decode_and_play(&bytes, PcmFormat::SPEECH).unwrap();

    let ctx = session.context().unwrap();
    assert_eq!(ctx.calls(), vec![Call::Start { frames: 4, rate: 24_000 }]);
}
