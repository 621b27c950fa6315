//! PCM16 decoding and one-shot playback for PolyGlot Studio.
//!
//! The pipeline is: raw bytes → [`decode_pcm16le`] → [`DecodedAudioBuffer`] →
//! [`OutputSession::play`]. The session lazily opens a single output context
//! (a CPAL device in production, anything implementing [`OutputFactory`] in tests)
//! and starts each buffer as an independent source on it.

pub mod asset;
pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod output;
pub mod pcm;
pub mod playback;
pub mod queue;
pub mod resample;
pub mod session;

pub use buffer::DecodedAudioBuffer;
pub use config::PlaybackConfig;
pub use error::{AudioError, Result};
pub use output::{
    AudioOutput, CpalOutput, CpalOutputFactory, FinishSignal, OutputFactory, OutputState,
    PlaybackEnd, PlaybackHandle,
};
pub use pcm::{PcmFormat, decode_pcm16le, decode_pcm16le_lenient, decode_with_format};
pub use session::{OutputSession, play};
