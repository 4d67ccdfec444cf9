//! Conversation state machine
//!
//! Drives one question/answer cycle at a time:
//!
//! ```text
//!   Idle ──hotkey──▶ Listening ──audio──▶ Processing ──answer──▶ Speaking
//!    ▲                  │                    │   │                  │
//!    └────── empty ─────┘                    │   └── exit phrase ──▶ Terminated
//!    └──────────────── error ────────────────┘                      │
//!    └──────────────────── done / interrupted ──────────────────────┘
//! ```
//!
//! Every state is announced to the notifier before any of its work starts.
//! Listening and Speaking clear the interrupt on entry and bind the hotkey
//! for their duration; unbinding clears it again, so no press crosses a
//! phase boundary.
//! Failures inside a turn are logged and send the loop back to Idle; the
//! loop itself never returns an error.

use crate::audio::playback::{PlaybackOutcome, Player};
use crate::audio::{AudioCaptureService, CaptureBuffer, CaptureOutcome};
use crate::hotkey::HotkeyGate;
use crate::interrupt::InterruptSignal;
use crate::push::StateNotifier;
use crate::query::LanguageQuery;
use crate::speech::Synthesizer;
use crate::state::ConversationState;
use crate::text::ExitPhrases;
use crate::transcribe::Transcriber;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Internal phase, carrying the data handed from one state to the next
#[derive(Debug)]
enum Phase {
    Idle,
    Listening,
    Processing(CaptureBuffer),
    Speaking(String),
    Terminated,
}

impl Phase {
    fn state(&self) -> ConversationState {
        match self {
            Phase::Idle => ConversationState::Idle,
            Phase::Listening => ConversationState::Listening,
            Phase::Processing(_) => ConversationState::Processing,
            Phase::Speaking(_) => ConversationState::Speaking,
            Phase::Terminated => ConversationState::Terminated,
        }
    }
}

/// Everything the conversation needs, assembled by the caller
pub struct ConversationParts {
    pub interrupt: Arc<InterruptSignal>,
    pub gate: HotkeyGate,
    pub capture: AudioCaptureService,
    pub transcriber: Box<dyn Transcriber>,
    pub query: Box<dyn LanguageQuery>,
    pub synthesizer: Box<dyn Synthesizer>,
    pub player: Box<dyn Player>,
    pub notifier: Arc<dyn StateNotifier>,
    pub exit_phrases: ExitPhrases,
    /// Set from outside (Ctrl-C) to end the loop at the next state boundary
    pub shutdown: Arc<AtomicBool>,
}

pub struct Conversation {
    parts: ConversationParts,
    phase: Phase,
}

impl Conversation {
    pub fn new(parts: ConversationParts) -> Self {
        Self {
            parts,
            phase: Phase::Idle,
        }
    }

    /// The current state
    pub fn state(&self) -> ConversationState {
        self.phase.state()
    }

    /// Run until Terminated
    pub fn run(&mut self) -> ConversationState {
        tracing::info!("Conversation started, waiting for the hotkey");
        while !self.state().is_terminated() {
            self.step();
        }
        tracing::info!("Conversation terminated");
        ConversationState::Terminated
    }

    /// Execute the current state's work and move to the next state.
    /// Returns the state entered.
    pub fn step(&mut self) -> ConversationState {
        if self.state().is_terminated() {
            return ConversationState::Terminated;
        }
        if self.shutdown_requested() {
            tracing::info!("Shutdown requested");
            self.enter(Phase::Terminated);
            return self.state();
        }

        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        let next = match phase {
            Phase::Idle => self.wait_for_start(),
            Phase::Listening => self.listen(),
            Phase::Processing(buffer) => self.process(buffer),
            Phase::Speaking(answer) => self.speak(&answer),
            Phase::Terminated => {
                self.phase = Phase::Terminated;
                return ConversationState::Terminated;
            }
        };

        // Shutdown may have raised the interrupt mid-phase
        let next = if self.shutdown_requested() {
            Phase::Terminated
        } else {
            next
        };
        self.enter(next);
        self.state()
    }

    fn shutdown_requested(&self) -> bool {
        self.parts.shutdown.load(Ordering::SeqCst)
    }

    fn enter(&mut self, next: Phase) {
        let state = next.state();
        tracing::debug!("Entering {}", state);
        self.phase = next;
        self.parts.notifier.notify(state);
    }

    fn wait_for_start(&mut self) -> Phase {
        let binding = self.parts.gate.bind();
        self.parts.interrupt.wait_and_consume();
        binding.unbind();
        Phase::Listening
    }

    fn listen(&mut self) -> Phase {
        let binding = self.parts.gate.bind();
        // A press left over from the start trigger must not stop the recording
        self.parts.interrupt.clear();
        let result = self.parts.capture.capture();
        binding.unbind();

        match result {
            Ok(CaptureOutcome::Captured(buffer)) => Phase::Processing(buffer),
            Ok(CaptureOutcome::Empty) => {
                tracing::info!("Nothing was recorded");
                Phase::Idle
            }
            Err(e) => {
                tracing::error!("Recording failed: {}", e);
                Phase::Idle
            }
        }
    }

    fn process(&mut self, buffer: CaptureBuffer) -> Phase {
        let text = match self.parts.transcriber.transcribe(&buffer) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Transcription failed: {}", e);
                return Phase::Idle;
            }
        };
        drop(buffer);

        let text = text.trim();
        if text.is_empty() {
            tracing::info!("No speech recognized");
            return Phase::Idle;
        }
        tracing::info!("Question: {:?}", text);

        if self.parts.exit_phrases.matches(text) {
            tracing::info!("Exit phrase heard");
            return Phase::Terminated;
        }

        match self.parts.query.query(text) {
            Ok(answer) => Phase::Speaking(answer),
            Err(e) => {
                tracing::error!("Language service failed: {}", e);
                Phase::Idle
            }
        }
    }

    fn speak(&mut self, answer: &str) -> Phase {
        // Unbinding on any return, early ones included, discards a press
        // the player never got to consume
        let binding = self.parts.gate.bind();
        self.parts.interrupt.clear();

        let audio = match self.parts.synthesizer.synthesize(answer) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::error!("Speech synthesis failed: {}", e);
                return Phase::Idle;
            }
        };

        match self.parts.player.play(&audio, &self.parts.interrupt) {
            Ok(PlaybackOutcome::Completed) => {}
            Ok(PlaybackOutcome::Interrupted) => tracing::info!("Answer interrupted"),
            Err(e) => tracing::error!("Playback failed: {}", e),
        }
        binding.unbind();

        Phase::Idle
    }
}
