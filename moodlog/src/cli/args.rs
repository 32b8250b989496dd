//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::models::Focus;

/// moodlog - AI diary companion service
#[derive(Parser, Debug)]
#[command(name = "moodlog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Address to bind
        #[arg(long, env = "MOODLOG_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, env = "MOODLOG_PORT", default_value = "3000")]
        port: u16,
    },

    /// Show which vendors are configured
    Status {
        /// Also send a minimal request to every chat vendor
        #[arg(long)]
        probe: bool,
    },

    /// Chat with the companion in the terminal
    Talk {
        /// Conversation focus: event, emotion, growth or all
        #[arg(short, long, default_value = "all")]
        focus: Focus,

        /// Skip writing a diary when the conversation ends
        #[arg(long)]
        no_diary: bool,
    },

    /// Write a diary entry from a saved conversation
    Diary {
        /// JSON message array, or a transcript of `用户:` / `AI:` lines
        #[arg(short, long)]
        file: PathBuf,

        /// Print the diary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Synthesize speech into an audio file
    Speak {
        /// Where to write the audio
        #[arg(short, long)]
        output: PathBuf,

        /// Playback speed multiplier
        #[arg(long)]
        speed: Option<f32>,

        /// Vendor voice name
        #[arg(long)]
        voice: Option<String>,

        /// Text to read aloud
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },

    /// Transcribe an audio file
    Transcribe {
        /// Audio file to transcribe
        file: PathBuf,

        /// Mime type; guessed from the extension when omitted
        #[arg(long)]
        mime: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn talk_parses_focus() {
        let cli = Cli::try_parse_from(["moodlog", "talk", "--focus", "growth"]).unwrap();
        match cli.command {
            Commands::Talk { focus, no_diary } => {
                assert_eq!(focus, Focus::Growth);
                assert!(!no_diary);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn speak_joins_trailing_words() {
        let args = ["moodlog", "speak", "-o", "out.wav", "晚安", "朋友"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Speak { text, output, .. } => {
                assert_eq!(text, vec!["晚安", "朋友"]);
                assert_eq!(output, PathBuf::from("out.wav"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn zero_timing_values_are_rejected() {
        for flag in ["--sweep-interval-secs", "--turn-timeout-secs"] {
            let err = Cli::try_parse_from(["moodlog", flag, "0", "status"]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation, "{flag}");
        }

        let cli = Cli::try_parse_from(["moodlog", "--sweep-interval-secs", "1", "status"]).unwrap();
        assert_eq!(cli.settings.sweep_interval_secs, 1);
    }
}
