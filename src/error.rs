//! Error types for voxloop
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.
//!
//! Only device initialization failures are fatal. Everything raised during
//! a conversation turn is absorbed by the conversation loop, which logs it
//! and returns to idle.

use thiserror::Error;

/// Top-level error type for the voxloop application
#[derive(Error, Debug)]
pub enum VoxloopError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transcription error: {0}")]
    Transcribe(#[from] TranscribeError),

    #[error("Language service error: {0}")]
    Query(#[from] QueryError),

    #[error("Speech synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Push server error: {0}")]
    Push(#[from] PushError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to hotkey detection
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Cannot open input device '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    DeviceAccess(String),

    #[error("Unknown key name: '{0}'. Use evtest or wev to find valid key names.")]
    UnknownKey(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("evdev error: {0}")]
    Evdev(String),

    #[error("Hotkey capture not supported: {0}")]
    NotSupported(String),
}

/// Errors related to audio input and output devices
#[derive(Error, Debug)]
pub enum AudioError {
    /// The audio path cannot be opened at all. Fatal at startup.
    #[error("Audio device initialization failed: {0}")]
    DeviceInit(String),

    #[error("Audio device not found: '{requested}'\n{available}")]
    DeviceNotFound { requested: String, available: String },

    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// Errors related to speech-to-text transcription
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Whisper initialization failed: {0}")]
    InitFailed(String),

    #[error("Transcription failed: {0}")]
    InferenceFailed(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Remote server error: {0}")]
    RemoteError(String),
}

/// Errors from the language-reasoning service
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Language service unavailable: {0}")]
    Unavailable(String),

    #[error("Language service timed out after {0}s")]
    Timeout(u64),

    #[error("Language service returned an empty answer")]
    EmptyAnswer,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Classroom profile error: {0}")]
    Classroom(String),
}

/// Errors from text-to-speech synthesis
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Speech synthesis failed: {0}")]
    Failed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Remote server error: {0}")]
    RemoteError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Synthesizer produced no audio")]
    EmptyAudio,
}

/// Errors from playing synthesized speech
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Audio output unavailable: {0}")]
    Output(String),

    #[error("Failed to decode speech audio: {0}")]
    Decode(String),
}

/// Errors from the observer push server
#[derive(Error, Debug)]
pub enum PushError {
    #[error("Invalid push bind address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to bind push server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using VoxloopError
pub type Result<T> = std::result::Result<T, VoxloopError>;
