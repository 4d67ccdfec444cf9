//! Voxloop: one-key voice assistant
//!
//! This library provides the core functionality for:
//! - Detecting hotkey presses via evdev (Linux) or rdev (macOS)
//! - Capturing audio via cpal and playing answers via rodio
//! - Transcribing speech using whisper.cpp or an OpenAI-compatible server
//! - Asking a language model (local command or Ollama) with a classroom prompt
//! - Synthesizing the answer (local command or remote speech endpoint)
//! - Pushing every state change to WebSocket observers
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐  raise   ┌──────────────────┐
//!   │    Hotkey    │ ───────▶ │ InterruptSignal  │ ◀──── Ctrl-C / SIGTERM
//!   │   listener   │          └──────────────────┘
//!   └──────────────┘                   │ wait / consume
//!                                      ▼
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                       Conversation                               │
//!   │  Idle ──▶ Listening ──▶ Processing ──▶ Speaking ──▶ Idle ...     │
//!   └──────────────────────────────────────────────────────────────────┘
//!        │            │               │                │
//!        │            ▼               ▼                ▼
//!        │      ┌──────────┐   ┌────────────┐   ┌─────────────┐
//!        │      │  Audio   │   │ Transcribe │   │ Synthesize  │
//!        │      │ capture  │   │  + Query   │   │  + Playback │
//!        │      └──────────┘   └────────────┘   └─────────────┘
//!        ▼ state
//!   ┌──────────────┐  {"estado": ...}  ┌──────────────┐
//!   │   Observer   │ ─────────────────▶│  WebSocket   │
//!   │   registry   │                   │  observers   │
//!   └──────────────┘                   └──────────────┘
//! ```

pub mod audio;
pub mod command;
pub mod config;
pub mod conversation;
pub mod daemon;
pub mod error;
pub mod hotkey;
pub mod http;
pub mod interrupt;
pub mod push;
pub mod query;
pub mod speech;
pub mod state;
pub mod text;
pub mod transcribe;

pub use config::Config;
pub use conversation::{Conversation, ConversationParts};
pub use daemon::Daemon;
pub use error::{Result, VoxloopError};
pub use state::ConversationState;
