// Command-line interface definitions for voxloop
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "voxloop")]
#[command(author, version, about = "Hands-free voice assistant for the classroom")]
#[command(long_about = "
Voxloop is a one-key voice assistant. A child presses the hotkey, asks a
question out loud, presses again to stop, and hears a short spoken answer.
The same key cuts the answer off. Saying an exit phrase (\"salir\", \"adiós\")
ends the session.

SETUP:
  1. Add yourself to the input group: sudo usermod -aG input $USER
  2. Log out and back in
  3. Put a whisper model (e.g. ggml-base.bin) in ~/.local/share/voxloop/models
  4. Make sure the language command (default: ollama) and the speech
     command (default: espeak-ng) are installed
  5. Run: voxloop

OBSERVERS:
  UI overlays can connect to ws://127.0.0.1:8765 and receive
  {\"estado\": \"escuchar\" | \"procesar\" | \"hablar\" | \"inactivo\" | \"terminado\"}.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override hotkey (e.g., SCROLLLOCK, PAUSE, F13)
    #[arg(long, value_name = "KEY")]
    pub hotkey: Option<String>,

    /// Override whisper model (tiny, base, small, medium, large-v3)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Override push server address (host:port)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Do not start the observer push server
    #[arg(long)]
    pub no_push: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the conversation loop (default if no command specified)
    Run,

    /// Show the effective configuration
    Config {
        /// Write the default config file if none exists
        #[arg(long)]
        init: bool,
    },

    /// List audio input devices
    Devices,

    /// Transcribe a WAV file with the configured backend
    Transcribe {
        /// Path to audio file
        file: std::path::PathBuf,
    },

    /// Send a typed question to the language service and print the answer
    Ask {
        /// The question
        question: String,
    },
}
