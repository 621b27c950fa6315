//! Output device discovery and stream configuration.
//!
//! Thin wrappers around CPAL for:
//! - listing output devices
//! - selecting the default device or one matched by name
//! - picking a stream config close to the rate of the audio being played

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::{AudioError, Result};

/// Summary of an output device for `--list-devices` style listings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub min_rate: u32,
    pub max_rate: u32,
}

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::unavailable("enumerate output devices", e))?;
        for d in devices {
            let matched = d
                .description()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false);
            if matched {
                return Ok(d);
            }
        }
        return Err(AudioError::PlaybackUnavailable(format!(
            "no output device matched: {needle}"
        )));
    }

    host.default_output_device()
        .ok_or_else(|| AudioError::PlaybackUnavailable("no default output device".to_string()))
}

/// Choose an output config for audio at `preferred_rate`.
///
/// Ranges that contain the preferred rate win outright; otherwise the closest
/// rate at or below it, then the lowest rate above it. Float formats are
/// preferred over integer ones at equal rates.
pub fn pick_output_config(
    device: &cpal::Device,
    preferred_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| AudioError::unavailable("query output configs", e))?;

    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), preferred_rate);
        let candidate = Candidate {
            rate,
            format_rank: sample_format_rank(range.sample_format()),
            channels: range.channels(),
        };
        let replace = best
            .as_ref()
            .is_none_or(|(b, _)| candidate.beats(b, preferred_rate));
        if replace {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| AudioError::PlaybackUnavailable("no supported output configs".to_string()))
}

/// Fixed buffer size when the device reports a range (capped), else the device default.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    const MAX_FRAMES: u32 = 4096;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed((*max).min(MAX_FRAMES).max(*min)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Describe every output device on `host`. Devices whose configs cannot be read
/// are listed with their default config rate, or skipped with a warning.
pub fn list_device_infos(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|desc| desc.name().to_string());
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::unavailable("enumerate output devices", e))?;

    let mut out = Vec::new();
    for d in devices {
        let Ok(desc) = d.description() else {
            continue;
        };
        let name = desc.name().to_string();
        let (mut min_rate, mut max_rate) = (u32::MAX, 0u32);
        if let Ok(ranges) = d.supported_output_configs() {
            for r in ranges {
                min_rate = min_rate.min(r.min_sample_rate());
                max_rate = max_rate.max(r.max_sample_rate());
            }
        }
        if max_rate == 0 {
            match d.default_output_config() {
                Ok(cfg) => {
                    min_rate = cfg.sample_rate();
                    max_rate = cfg.sample_rate();
                }
                Err(e) => {
                    tracing::warn!(device = %name, "skipping device without usable config: {e}");
                    continue;
                }
            }
        }
        out.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            min_rate,
            max_rate,
        });
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    rate: u32,
    format_rank: u8,
    channels: u16,
}

impl Candidate {
    fn beats(&self, other: &Candidate, preferred: u32) -> bool {
        let (a, b) = (rate_rank(self.rate, preferred), rate_rank(other.rate, preferred));
        if a != b {
            return a < b;
        }
        if self.format_rank != other.format_rank {
            return self.format_rank < other.format_rank;
        }
        // Fewer channels means less up-mixing for mono speech.
        self.channels < other.channels
    }
}

/// Lower is better: exact match, then below (closest first), then above (closest first).
fn rate_rank(rate: u32, preferred: u32) -> (u8, u32) {
    if rate == preferred {
        (0, 0)
    } else if rate < preferred {
        (1, preferred - rate)
    } else {
        (2, rate - preferred)
    }
}

fn clamp_rate(min: u32, max: u32, preferred: u32) -> u32 {
    preferred.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}
