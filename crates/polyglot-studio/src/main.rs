//! `polyglot`: command-line front end for PolyGlot Studio.
//!
//! ## Commands
//! - `localize`: translate + cultural analysis, adapted image, spoken voice-over
//! - `speak`: synthesize and play a line in a market's voice
//! - `chat`: assistant conversation grounded on a saved localization result
//! - `play-pcm` / `preview`: play raw PCM16 or an encoded audio asset
//!
//! Playback is started fire-and-forget by the library; the CLI then waits for the
//! source to finish so the process does not exit mid-sentence. Ctrl-C stops the
//! current source (a second Ctrl-C exits immediately).

mod cli;

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{CommandFactory, Parser};
use polyglot_audio::{
    CpalOutputFactory, DecodedAudioBuffer, OutputSession, PcmFormat, PlaybackEnd, PlaybackHandle,
    asset, decode_pcm16le, decode_pcm16le_lenient, device,
};
use polyglot_studio::assistant::Assistant;
use polyglot_studio::config::StudioConfig;
use polyglot_studio::media::ProjectMedia;
use polyglot_studio::{
    CancelToken, GeminiService, LocalizationReport, LocalizationRequest, LocalizationResult,
    StageOutcome, Studio, TargetLanguage,
};
use tracing_subscriber::EnvFilter;

const WAIT_POLL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,polyglot=info,polyglot_studio=info,polyglot_audio=info")
        }))
        .init();

    if args.list_devices {
        return list_devices();
    }

    let Some(cmd) = args.cmd else {
        cli::Args::command().print_help()?;
        return Ok(());
    };

    let (cfg, cfg_path) = StudioConfig::discover(args.config.as_deref())?;
    if let Some(path) = cfg_path.as_ref() {
        tracing::info!(config = %path.display(), "config loaded");
    }
    let device = args.device.clone().or_else(|| cfg.device());

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        if on_interrupt.is_cancelled() {
            std::process::exit(130);
        }
        tracing::info!("interrupted; stopping playback");
        on_interrupt.cancel();
    })
    .context("install ctrl-c handler")?;

    let session_at = |rate: u32| {
        Arc::new(OutputSession::new(
            CpalOutputFactory::new(device.clone(), cfg.playback()),
            rate,
        ))
    };

    match cmd {
        cli::Command::Localize {
            text,
            language,
            media,
            image_out,
            no_image,
            no_voice,
            json,
        } => {
            let language = resolve_language(language, &cfg)?;
            let mut request = LocalizationRequest::new(text, language);
            if let Some(path) = media {
                request = request.with_media(ProjectMedia::load(&path)?);
            }
            request.generate_image = !no_image;
            request.voice_over = !no_voice;

            let service = GeminiService::from_config(&cfg)?;
            let format = cfg.speech_format();
            let studio = Studio::new(service, session_at(format.sample_rate), format);
            let report = studio.localize(&request, &cancel)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report.result)?);
            } else {
                print_report(&report);
            }
            if let Some(image) = report.image.completed() {
                match image_out.as_deref() {
                    Some(path) => {
                        std::fs::write(path, &image.bytes)
                            .with_context(|| format!("write image {:?}", path))?;
                        tracing::info!(path = %path.display(), "adapted image saved");
                    }
                    None => tracing::info!(
                        "adapted image generated ({} bytes, .{}); pass --image-out to save it",
                        image.bytes.len(),
                        image.extension()
                    ),
                }
            }
            if let Some(audio) = report.audio.completed() {
                wait_for_playback(&audio.handle, &cancel);
            }
        }

        cli::Command::Speak {
            text,
            language,
            no_wait,
        } => {
            let language = resolve_language(language, &cfg)?;
            let service = GeminiService::from_config(&cfg)?;
            let format = cfg.speech_format();
            let studio = Studio::new(service, session_at(format.sample_rate), format);
            match studio.speak(&text, language, &cancel) {
                StageOutcome::Completed(summary) => {
                    if !no_wait {
                        wait_for_playback(&summary.handle, &cancel);
                    }
                }
                StageOutcome::Skipped(reason) => tracing::info!("nothing played: {reason}"),
                StageOutcome::Failed { stage, error } => bail!("{stage} failed: {error}"),
            }
        }

        cli::Command::Chat { context } => {
            let context = context.as_deref().map(load_result).transpose()?;
            let service = GeminiService::from_config(&cfg)?;
            run_chat(&service, context)?;
        }

        cli::Command::PlayPcm {
            path,
            sample_rate,
            channels,
            lenient,
        } => {
            let speech = cfg.speech_format();
            let format = PcmFormat::new(
                sample_rate.unwrap_or(speech.sample_rate),
                channels.unwrap_or(speech.channels),
            );
            let bytes = std::fs::read(&path).with_context(|| format!("read {:?}", path))?;
            let buffer = if lenient {
                decode_pcm16le_lenient(&bytes, format.sample_rate, format.channels)?
            } else {
                decode_pcm16le(&bytes, format.sample_rate, format.channels)?
            };
            play_and_wait(&session_at(format.sample_rate), buffer, &cancel)?;
        }

        cli::Command::Preview { path } => {
            let decoded = asset::decode_file(&path).with_context(|| format!("decode {:?}", path))?;
            tracing::info!(
                codec = %decoded.info.codec,
                rate_hz = decoded.info.sample_rate,
                channels = decoded.info.channels,
                bits = ?decoded.info.bits_per_sample,
                duration_ms = decoded.info.duration.as_millis() as u64,
                peak = decoded.buffer.peak(),
                "previewing asset"
            );
            play_and_wait(&session_at(decoded.info.sample_rate), decoded.buffer, &cancel)?;
        }
    }

    Ok(())
}

fn resolve_language(flag: Option<TargetLanguage>, cfg: &StudioConfig) -> Result<TargetLanguage> {
    match flag {
        Some(lang) => Ok(lang),
        None => cfg.default_language()?.ok_or_else(|| {
            anyhow!("--language is required (or set default_language in the config)")
        }),
    }
}

fn load_result(path: &Path) -> Result<LocalizationResult> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parse localization result {:?}", path))
}

fn play_and_wait(
    session: &OutputSession<CpalOutputFactory>,
    buffer: DecodedAudioBuffer,
    cancel: &CancelToken,
) -> Result<()> {
    let handle = session.play(buffer)?;
    match wait_for_playback(&handle, cancel) {
        PlaybackEnd::Failed(reason) => Err(anyhow!("playback failed: {reason}")),
        _ => Ok(()),
    }
}

fn wait_for_playback(handle: &PlaybackHandle, cancel: &CancelToken) -> PlaybackEnd {
    loop {
        if let Some(end) = handle.wait_finished_timeout(WAIT_POLL) {
            tracing::debug!(?end, played_frames = handle.played_frames(), "playback ended");
            return end;
        }
        if cancel.is_cancelled() {
            handle.stop();
        }
    }
}

fn run_chat(service: &GeminiService, context: Option<LocalizationResult>) -> Result<()> {
    let mut assistant = Assistant::new(service, context);
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
        match assistant.send(&line) {
            Ok(Some(reply)) => writeln!(stdout, "{reply}\n")?,
            Ok(None) => {}
            Err(e) => eprintln!("assistant error: {e}"),
        }
    }
    Ok(())
}

fn print_report(report: &LocalizationReport) {
    let r = &report.result;
    println!("Translation:\n  {}\n", r.translated_text);
    if !r.cultural_notes.is_empty() {
        println!("Cultural notes:");
        for note in &r.cultural_notes {
            println!("  - {note}");
        }
        println!();
    }
    if let Some(worst) = r.highest_severity() {
        println!("Cultural flags (highest severity: {worst}):");
        for flag in &r.cultural_flags {
            println!("  [{}] {} -> {}", flag.severity, flag.issue, flag.suggestion);
        }
        println!();
    }
    println!("Suggested visual changes:\n  {}\n", r.suggested_visual_changes);
    println!("Brand voice:\n  {}\n", r.brand_voice_check);
    println!("Quality score: {:.0}%", r.quality_score * 100.0);

    println!("Image: {}", outcome_label(&report.image));
    println!("Voice-over: {}", outcome_label(&report.audio));
}

fn outcome_label<T>(outcome: &StageOutcome<T>) -> String {
    match outcome {
        StageOutcome::Completed(_) => "ready".to_string(),
        StageOutcome::Skipped(reason) => format!("skipped ({reason})"),
        StageOutcome::Failed { stage, error } => format!("failed at {stage}: {error}"),
    }
}

fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    let devices = device::list_device_infos(&host)?;
    if devices.is_empty() {
        println!("no output devices");
    }
    for (i, d) in devices.iter().enumerate() {
        let marker = if d.is_default { " (default)" } else { "" };
        println!("#{i}: {}{marker}  {}-{} Hz", d.name, d.min_rate, d.max_rate);
    }
    Ok(())
}
