use std::path::PathBuf;

use clap::{Parser, Subcommand};

use polyglot_studio::TargetLanguage;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(
    name = "polyglot",
    version = VERSION,
    about = "Localize campaigns and hear the voice-over"
)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Config file (defaults to polyglot.toml next to the executable)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Localize campaign text (and optional media), adapt the image, play the voice-over
    Localize {
        #[arg(long, default_value = "")]
        text: String,

        /// Target language: name or code (ja, es, fr, de, zh, ar)
        #[arg(long)]
        language: Option<TargetLanguage>,

        /// Image or audio asset to localize alongside the text
        #[arg(long)]
        media: Option<PathBuf>,

        /// Write the adapted image here
        #[arg(long)]
        image_out: Option<PathBuf>,

        /// Skip image generation
        #[arg(long)]
        no_image: bool,

        /// Skip speech synthesis and playback
        #[arg(long)]
        no_voice: bool,

        /// Print the localization result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Synthesize text in a language's voice and play it
    Speak {
        #[arg(long)]
        text: String,

        #[arg(long)]
        language: Option<TargetLanguage>,

        /// Return as soon as playback starts
        #[arg(long)]
        no_wait: bool,
    },

    /// Chat with the assistant (one message per line, empty line or EOF quits)
    Chat {
        /// LocalizationResult JSON to ground the conversation on
        #[arg(long)]
        context: Option<PathBuf>,
    },

    /// Play a raw PCM16 little-endian file
    PlayPcm {
        path: PathBuf,

        #[arg(long)]
        sample_rate: Option<u32>,

        #[arg(long)]
        channels: Option<usize>,

        /// Drop a trailing partial frame instead of rejecting the file
        #[arg(long)]
        lenient: bool,
    },

    /// Decode an audio asset (wav, flac, mp3, ...) and play it
    Preview { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_localize_flags() {
        let args = Args::try_parse_from([
            "polyglot", "localize", "--text", "Summer sale", "--language", "ja", "--no-voice",
        ])
        .unwrap();
        match args.cmd {
            Some(Command::Localize {
                text,
                language,
                no_voice,
                json,
                ..
            }) => {
                assert_eq!(text, "Summer sale");
                assert_eq!(language, Some(TargetLanguage::Japanese));
                assert!(no_voice);
                assert!(!json);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_language() {
        let parsed =
            Args::try_parse_from(["polyglot", "speak", "--text", "x", "--language", "xx"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn global_device_after_subcommand() {
        let args =
            Args::try_parse_from(["polyglot", "preview", "a.wav", "--device", "usb"]).unwrap();
        assert_eq!(args.device.as_deref(), Some("usb"));
    }
}
