//! Configuration loading and types for voxloop
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/voxloop/config.toml)
//! 3. Environment variables (VOXLOOP_*)
//! 4. CLI arguments (highest priority)

use crate::error::VoxloopError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Voxloop Configuration
#
# Location: ~/.config/voxloop/config.toml
# All settings can be overridden via CLI flags

[hotkey]
# Single key that starts a question and interrupts recording or playback
# Common choices: SCROLLLOCK, PAUSE, F13-F24
# Use `evtest` to find key names for your keyboard
key = "SCROLLLOCK"

# Optional modifier keys that must also be held
# Example: modifiers = ["LEFTCTRL"]
modifiers = []

[audio]
# Audio input device ("default" uses system default)
# List devices with: voxloop devices
device = "default"

# Sample rate in Hz delivered to transcription (whisper expects 16000)
sample_rate = 16000

# How often capture and playback check for an interrupt, in milliseconds.
# This is also the worst-case delay between the key press and the stop.
poll_interval_ms = 100

# Stop recording automatically after this many seconds (0 = no limit)
max_duration_secs = 30

# Audio output device for spoken answers ("default" uses system default)
output_device = "default"

# Playback volume (0.0 to 1.0)
volume = 1.0

[transcribe]
# "local" runs whisper.cpp in-process, "remote" posts audio to an
# OpenAI-compatible /v1/audio/transcriptions endpoint
backend = "local"

# Whisper model name (tiny, base, small, medium, large-v3) or absolute path
model = "base"

# Spoken language ("auto" for detection)
language = "es"

# remote_endpoint = "http://192.168.1.100:8080"
# remote_model = "whisper-1"
# remote_timeout_secs = 30

[query]
# "command" runs a program with the prompt as its last argument,
# "ollama" calls the Ollama HTTP API
backend = "command"
command = ["ollama", "run", "llama3.2:1b"]
ollama_url = "http://localhost:11434"
ollama_model = "llama3.2:1b"
timeout_secs = 60

# Optional classroom profile (JSON with aula, palabra_clave_asamblea,
# temas_aprendidos, preferencias_locales) inserted into the prompt
# classroom_file = "/home/profe/salon-data.json"

[speech]
# "command" runs a program with the answer as its last argument and plays
# its stdout (WAV or MP3). "remote" calls an OpenAI-compatible
# /v1/audio/speech endpoint.
backend = "command"
command = ["espeak-ng", "-v", "es", "--stdout"]
timeout_secs = 30

[push]
# WebSocket server announcing {"estado": ...} to observers (UI overlays)
enabled = true
bind = "127.0.0.1:8765"

# Observers that cannot take a message within this budget are dropped
send_timeout_ms = 500

# Undelivered messages kept per observer before it is considered stalled
queue_depth = 16

# Also announce the idle state ("inactivo")
include_idle = true

[conversation]
# Saying one of these ends the session (case and accents are ignored)
exit_phrases = ["salir", "terminar", "adiós", "stop", "goodbye"]
"#;

/// Default prompt template. `{classroom}` and `{question}` are substituted.
pub const DEFAULT_PROMPT: &str = "Responde en una sola frase de no más de 50 palabras. \
Sé claro, directo y en español.\n\n\
Toma el rol de un profesor especializado en educación física y alimentaria hablándole a niños. \
Cada pregunta es hecha por un niño, así que responde acorde. \
Recuerda que eres peruano, así que contesta acorde a la cultura peruana.\n\
{classroom}Pregunta: {question}";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub transcribe: TranscribeConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Hotkey detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    /// Key name (evdev KEY_* constant name, without the KEY_ prefix)
    /// Examples: "SCROLLLOCK", "PAUSE", "F24"
    #[serde(default = "default_hotkey_key")]
    pub key: String,

    /// Optional modifier keys that must also be held
    #[serde(default)]
    pub modifiers: Vec<String>,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key: default_hotkey_key(),
            modifiers: vec![],
        }
    }
}

/// Audio capture and playback configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Input device name, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Sample rate of captured frames in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Interrupt poll interval for capture and playback
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Recording safety limit in seconds, 0 disables it
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u32,

    /// Output device name for spoken answers, or "default"
    #[serde(default = "default_device")]
    pub output_device: String,

    /// Playback volume (0.0 to 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            poll_interval_ms: default_poll_interval_ms(),
            max_duration_secs: default_max_duration_secs(),
            output_device: default_device(),
            volume: default_volume(),
        }
    }
}

/// Speech-to-text backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranscribeBackend {
    /// In-process whisper.cpp
    #[default]
    Local,
    /// OpenAI-compatible HTTP endpoint
    Remote,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscribeConfig {
    #[serde(default)]
    pub backend: TranscribeBackend,

    /// Whisper model name or absolute path to a .bin file
    #[serde(default = "default_model")]
    pub model: String,

    /// Language code (es, en, auto, ...)
    #[serde(default = "default_language")]
    pub language: String,

    /// Number of threads for inference (None = auto-detect)
    #[serde(default)]
    pub threads: Option<usize>,

    /// Base URL of the remote server, required for the remote backend
    #[serde(default)]
    pub remote_endpoint: Option<String>,

    /// Model name sent to the remote server
    #[serde(default)]
    pub remote_model: Option<String>,

    /// Bearer token for the remote server
    #[serde(default)]
    pub remote_api_key: Option<String>,

    #[serde(default)]
    pub remote_timeout_secs: Option<u64>,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            backend: TranscribeBackend::default(),
            model: default_model(),
            language: default_language(),
            threads: None,
            remote_endpoint: None,
            remote_model: None,
            remote_api_key: None,
            remote_timeout_secs: None,
        }
    }
}

/// Language service backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryBackend {
    /// External program, prompt passed as the last argument
    #[default]
    Command,
    /// Ollama /api/generate
    Ollama,
}

/// Language service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub backend: QueryBackend,

    /// Program and leading arguments for the command backend
    #[serde(default = "default_query_command")]
    pub command: Vec<String>,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    #[serde(default = "default_query_timeout")]
    pub timeout_secs: u64,

    /// Prompt template with `{question}` and optional `{classroom}`
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Optional classroom profile JSON file
    #[serde(default)]
    pub classroom_file: Option<PathBuf>,

    /// Markers where a generated answer is cut off
    #[serde(default = "default_stop_tokens")]
    pub stop_tokens: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            backend: QueryBackend::default(),
            command: default_query_command(),
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            timeout_secs: default_query_timeout(),
            prompt: default_prompt(),
            classroom_file: None,
            stop_tokens: default_stop_tokens(),
        }
    }
}

/// Speech synthesis backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackend {
    /// External program writing encoded audio to stdout
    #[default]
    Command,
    /// OpenAI-compatible /v1/audio/speech
    Remote,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechConfig {
    #[serde(default)]
    pub backend: SpeechBackend,

    #[serde(default = "default_speech_command")]
    pub command: Vec<String>,

    #[serde(default)]
    pub remote_endpoint: Option<String>,

    #[serde(default)]
    pub remote_model: Option<String>,

    #[serde(default)]
    pub remote_voice: Option<String>,

    #[serde(default)]
    pub remote_api_key: Option<String>,

    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackend::default(),
            command: default_speech_command(),
            remote_endpoint: None,
            remote_model: None,
            remote_voice: None,
            remote_api_key: None,
            timeout_secs: default_speech_timeout(),
        }
    }
}

/// Observer push server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// host:port to listen on
    #[serde(default = "default_push_bind")]
    pub bind: String,

    /// Per-message send budget for each observer
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Pending messages per observer before eviction
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Announce Idle as "inactivo"
    #[serde(default = "default_true")]
    pub include_idle: bool,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_push_bind(),
            send_timeout_ms: default_send_timeout_ms(),
            queue_depth: default_queue_depth(),
            include_idle: true,
        }
    }
}

/// Conversation loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationConfig {
    /// Utterances that end the session
    #[serde(default = "default_exit_phrases")]
    pub exit_phrases: Vec<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            exit_phrases: default_exit_phrases(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_hotkey_key() -> String {
    "SCROLLLOCK".to_string()
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_duration_secs() -> u32 {
    30
}

fn default_volume() -> f32 {
    1.0
}

fn default_model() -> String {
    "base".to_string()
}

fn default_language() -> String {
    "es".to_string()
}

fn default_query_command() -> Vec<String> {
    vec!["ollama".into(), "run".into(), "llama3.2:1b".into()]
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:1b".to_string()
}

fn default_query_timeout() -> u64 {
    60
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

fn default_stop_tokens() -> Vec<String> {
    ["<s>[INST]", "\nTú:", "¿Por", "Qué", "cómo", "Cuándo", "Dónde", "Quién", "Cuál"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_speech_command() -> Vec<String> {
    vec!["espeak-ng".into(), "-v".into(), "es".into(), "--stdout".into()]
}

fn default_speech_timeout() -> u64 {
    30
}

fn default_push_bind() -> String {
    "127.0.0.1:8765".to_string()
}

fn default_send_timeout_ms() -> u64 {
    500
}

fn default_queue_depth() -> usize {
    16
}

fn default_exit_phrases() -> Vec<String> {
    ["salir", "terminar", "adiós", "stop", "goodbye"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "voxloop")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path (for models)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "voxloop")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the models directory path
    pub fn models_dir() -> PathBuf {
        Self::data_dir().join("models")
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), VoxloopError> {
        if self.audio.sample_rate == 0 {
            return Err(VoxloopError::Config("audio.sample_rate must be > 0".into()));
        }
        if self.audio.poll_interval_ms == 0 {
            return Err(VoxloopError::Config(
                "audio.poll_interval_ms must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.audio.volume) {
            return Err(VoxloopError::Config(format!(
                "audio.volume must be between 0.0 and 1.0, got {}",
                self.audio.volume
            )));
        }
        if self.push.queue_depth == 0 {
            return Err(VoxloopError::Config("push.queue_depth must be > 0".into()));
        }
        if !self.query.prompt.contains("{question}") {
            return Err(VoxloopError::Config(
                "query.prompt must contain {question}".into(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, VoxloopError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| VoxloopError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| VoxloopError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    apply_env_overrides(&mut config);
    config.validate()?;

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var("VOXLOOP_HOTKEY") {
        config.hotkey.key = key;
    }
    if let Ok(model) = std::env::var("VOXLOOP_MODEL") {
        config.transcribe.model = model;
    }
    if let Ok(bind) = std::env::var("VOXLOOP_PUSH_BIND") {
        config.push.bind = bind;
    }
    if let Ok(url) = std::env::var("VOXLOOP_OLLAMA_URL") {
        config.query.ollama_url = url;
    }
}

/// Write the commented default config if no file exists yet
pub fn write_default_config(path: &Path) -> Result<bool, VoxloopError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| VoxloopError::Config(format!("Failed to create config dir: {}", e)))?;
    }
    std::fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| VoxloopError::Config(format!("Failed to write config: {}", e)))?;
    Ok(true)
}
