//! Conversation loop tests with in-memory devices and backends

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use voxloop::audio::playback::{PlaybackOutcome, Player};
use voxloop::audio::{
    AudioCaptureService, CaptureBuffer, CaptureDevice, CaptureSink, CaptureStream,
};
use voxloop::config::AudioConfig;
use voxloop::error::{AudioError, PlaybackError, QueryError, SynthesisError, TranscribeError};
use voxloop::hotkey::HotkeyGate;
use voxloop::interrupt::InterruptSignal;
use voxloop::push::StateNotifier;
use voxloop::query::LanguageQuery;
use voxloop::speech::{SpeechAudio, Synthesizer};
use voxloop::text::ExitPhrases;
use voxloop::transcribe::Transcriber;
use voxloop::{Conversation, ConversationParts, ConversationState};

struct FakeStream;

impl CaptureStream for FakeStream {
    fn name(&self) -> &str {
        "fake"
    }
}

/// Delivers `frames` on open, then presses the hotkey shortly after
struct FakeMic {
    frames: Vec<f32>,
    interrupt: Arc<InterruptSignal>,
}

impl CaptureDevice for FakeMic {
    fn open(&mut self, sink: CaptureSink) -> Result<Box<dyn CaptureStream>, AudioError> {
        sink.push(&self.frames);
        let interrupt = self.interrupt.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            interrupt.raise();
        });
        Ok(Box::new(FakeStream))
    }

    fn sample_rate(&self) -> u32 {
        16000
    }
}

struct FakeTranscriber {
    text: Result<String, String>,
    calls: Arc<AtomicUsize>,
}

impl Transcriber for FakeTranscriber {
    fn transcribe(&self, audio: &CaptureBuffer) -> Result<String, TranscribeError> {
        assert!(!audio.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.text
            .clone()
            .map_err(TranscribeError::InferenceFailed)
    }
}

/// Optionally leaves the interrupt raised while answering, as a late
/// press from an earlier phase would
struct FakeQuery {
    calls: Arc<AtomicUsize>,
    fail: bool,
    stray_press: Option<Arc<InterruptSignal>>,
}

impl LanguageQuery for FakeQuery {
    fn query(&self, question: &str) -> Result<String, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(interrupt) = &self.stray_press {
            interrupt.raise();
        }
        if self.fail {
            return Err(QueryError::Unavailable("offline".to_string()));
        }
        Ok(format!("Respuesta a: {}", question))
    }
}

/// With `press_then_fail`, the hotkey is pressed mid-synthesis and the
/// synthesizer then errors out
struct FakeSynth {
    calls: Arc<AtomicUsize>,
    press_then_fail: Option<HotkeyGate>,
}

impl Synthesizer for FakeSynth {
    fn synthesize(&self, text: &str) -> Result<SpeechAudio, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.press_then_fail {
            assert!(gate.raise_if_bound());
            return Err(SynthesisError::Failed("speaker crashed".to_string()));
        }
        Ok(SpeechAudio::new(text.as_bytes().to_vec()))
    }
}

/// Plays for up to `length`, stopping early on the interrupt
struct FakePlayer {
    length: Duration,
    outcomes: Arc<Mutex<Vec<PlaybackOutcome>>>,
}

impl Player for FakePlayer {
    fn play(
        &mut self,
        _audio: &SpeechAudio,
        interrupt: &InterruptSignal,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let outcome = if interrupt.wait_timeout_and_consume(self.length) {
            PlaybackOutcome::Interrupted
        } else {
            PlaybackOutcome::Completed
        };
        self.outcomes.lock().unwrap().push(outcome);
        Ok(outcome)
    }
}

#[derive(Default)]
struct Recorder {
    states: Mutex<Vec<ConversationState>>,
}

impl Recorder {
    fn states(&self) -> Vec<ConversationState> {
        self.states.lock().unwrap().clone()
    }
}

impl StateNotifier for Recorder {
    fn notify(&self, state: ConversationState) {
        self.states.lock().unwrap().push(state);
    }
}

struct Harness {
    conversation: Conversation,
    interrupt: Arc<InterruptSignal>,
    gate: HotkeyGate,
    recorder: Arc<Recorder>,
    shutdown: Arc<AtomicBool>,
    transcribe_calls: Arc<AtomicUsize>,
    query_calls: Arc<AtomicUsize>,
    synth_calls: Arc<AtomicUsize>,
    outcomes: Arc<Mutex<Vec<PlaybackOutcome>>>,
}

struct Setup {
    frames: Vec<f32>,
    heard: Result<String, String>,
    query_fails: bool,
    stray_press_while_processing: bool,
    press_then_synth_fails: bool,
    playback: Duration,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            frames: vec![0.1; 1600],
            heard: Ok("¿Por qué el cielo es azul?".to_string()),
            query_fails: false,
            stray_press_while_processing: false,
            press_then_synth_fails: false,
            playback: Duration::from_millis(10),
        }
    }
}

fn harness(setup: Setup) -> Harness {
    let interrupt = Arc::new(InterruptSignal::new());
    let gate = HotkeyGate::new(interrupt.clone());
    let recorder = Arc::new(Recorder::default());
    let shutdown = Arc::new(AtomicBool::new(false));
    let transcribe_calls = Arc::new(AtomicUsize::new(0));
    let query_calls = Arc::new(AtomicUsize::new(0));
    let synth_calls = Arc::new(AtomicUsize::new(0));
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let audio = AudioConfig {
        poll_interval_ms: 5,
        max_duration_secs: 5,
        ..AudioConfig::default()
    };
    let mic = FakeMic {
        frames: setup.frames,
        interrupt: interrupt.clone(),
    };

    let parts = ConversationParts {
        interrupt: interrupt.clone(),
        gate: gate.clone(),
        capture: AudioCaptureService::new(Box::new(mic), interrupt.clone(), &audio),
        transcriber: Box::new(FakeTranscriber {
            text: setup.heard,
            calls: transcribe_calls.clone(),
        }),
        query: Box::new(FakeQuery {
            calls: query_calls.clone(),
            fail: setup.query_fails,
            stray_press: setup
                .stray_press_while_processing
                .then(|| interrupt.clone()),
        }),
        synthesizer: Box::new(FakeSynth {
            calls: synth_calls.clone(),
            press_then_fail: setup.press_then_synth_fails.then(|| gate.clone()),
        }),
        player: Box::new(FakePlayer {
            length: setup.playback,
            outcomes: outcomes.clone(),
        }),
        notifier: recorder.clone(),
        exit_phrases: ExitPhrases::new(&["salir", "adiós"]),
        shutdown: shutdown.clone(),
    };

    Harness {
        conversation: Conversation::new(parts),
        interrupt,
        gate,
        recorder,
        shutdown,
        transcribe_calls,
        query_calls,
        synth_calls,
        outcomes,
    }
}

/// Press the hotkey and leave Idle
fn start_turn(h: &mut Harness) {
    assert_eq!(h.conversation.state(), ConversationState::Idle);
    h.interrupt.raise();
    assert_eq!(h.conversation.step(), ConversationState::Listening);
}

#[test]
fn test_full_turn_announces_every_state_in_order() {
    let mut h = harness(Setup::default());

    start_turn(&mut h);
    assert_eq!(h.conversation.step(), ConversationState::Processing);
    assert_eq!(h.conversation.step(), ConversationState::Speaking);
    assert_eq!(h.conversation.step(), ConversationState::Idle);

    assert_eq!(
        h.recorder.states(),
        vec![
            ConversationState::Listening,
            ConversationState::Processing,
            ConversationState::Speaking,
            ConversationState::Idle,
        ]
    );
    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.query_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.synth_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*h.outcomes.lock().unwrap(), vec![PlaybackOutcome::Completed]);
    assert!(!h.gate.is_bound());
}

#[test]
fn test_empty_recording_returns_to_idle() {
    let mut h = harness(Setup {
        frames: Vec::new(),
        ..Setup::default()
    });

    start_turn(&mut h);
    assert_eq!(h.conversation.step(), ConversationState::Idle);

    assert_eq!(
        h.recorder.states(),
        vec![ConversationState::Listening, ConversationState::Idle]
    );
    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.query_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_blank_transcription_returns_to_idle() {
    let mut h = harness(Setup {
        heard: Ok("   ".to_string()),
        ..Setup::default()
    });

    start_turn(&mut h);
    h.conversation.step();
    assert_eq!(h.conversation.step(), ConversationState::Idle);
    assert_eq!(h.query_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_exit_phrase_terminates_without_answering() {
    let mut h = harness(Setup {
        heard: Ok(" Salir. ".to_string()),
        ..Setup::default()
    });

    start_turn(&mut h);
    assert_eq!(h.conversation.step(), ConversationState::Processing);
    assert_eq!(h.conversation.step(), ConversationState::Terminated);

    assert_eq!(h.query_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.synth_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.recorder.states().last(),
        Some(&ConversationState::Terminated)
    );

    // Terminal: further steps do nothing and announce nothing
    let announced = h.recorder.states().len();
    assert_eq!(h.conversation.step(), ConversationState::Terminated);
    assert_eq!(h.recorder.states().len(), announced);
}

#[test]
fn test_exit_phrase_inside_sentence_is_a_question() {
    let mut h = harness(Setup {
        heard: Ok("¿Cómo se dice salir en inglés?".to_string()),
        ..Setup::default()
    });

    start_turn(&mut h);
    h.conversation.step();
    assert_eq!(h.conversation.step(), ConversationState::Speaking);
}

#[test]
fn test_transcription_failure_returns_to_idle() {
    let mut h = harness(Setup {
        heard: Err("model crashed".to_string()),
        ..Setup::default()
    });

    start_turn(&mut h);
    h.conversation.step();
    assert_eq!(h.conversation.step(), ConversationState::Idle);
    assert_eq!(h.query_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_query_failure_returns_to_idle_and_loop_continues() {
    let mut h = harness(Setup {
        query_fails: true,
        ..Setup::default()
    });

    start_turn(&mut h);
    h.conversation.step();
    assert_eq!(h.conversation.step(), ConversationState::Idle);
    assert_eq!(h.synth_calls.load(Ordering::SeqCst), 0);

    // Next turn still works
    start_turn(&mut h);
    assert_eq!(h.conversation.step(), ConversationState::Processing);
}

#[test]
fn test_hotkey_during_answer_stops_playback() {
    let mut h = harness(Setup {
        playback: Duration::from_secs(10),
        ..Setup::default()
    });

    start_turn(&mut h);
    h.conversation.step();
    assert_eq!(h.conversation.step(), ConversationState::Speaking);

    let interrupt = h.interrupt.clone();
    let presser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        interrupt.raise();
    });

    assert_eq!(h.conversation.step(), ConversationState::Idle);
    presser.join().unwrap();

    assert_eq!(
        *h.outcomes.lock().unwrap(),
        vec![PlaybackOutcome::Interrupted]
    );
    assert!(!h.interrupt.is_raised());
}

#[test]
fn test_stale_press_before_speaking_does_not_cut_answer() {
    let mut h = harness(Setup {
        stray_press_while_processing: true,
        playback: Duration::from_millis(200),
        ..Setup::default()
    });

    start_turn(&mut h);
    assert_eq!(h.conversation.step(), ConversationState::Processing);
    assert!(h.interrupt.is_raised());
    assert_eq!(h.conversation.step(), ConversationState::Speaking);
    assert_eq!(h.conversation.step(), ConversationState::Idle);

    assert_eq!(*h.outcomes.lock().unwrap(), vec![PlaybackOutcome::Completed]);
    let states = h.recorder.states();
    assert_eq!(
        states[states.len() - 2..],
        [ConversationState::Speaking, ConversationState::Idle]
    );
}

#[test]
fn test_press_during_failed_synthesis_does_not_start_next_turn() {
    let h = harness(Setup {
        press_then_synth_fails: true,
        ..Setup::default()
    });
    let Harness {
        mut conversation,
        interrupt,
        gate,
        synth_calls,
        outcomes,
        ..
    } = h;

    interrupt.raise();
    assert_eq!(conversation.step(), ConversationState::Listening);
    assert_eq!(conversation.step(), ConversationState::Processing);
    assert_eq!(conversation.step(), ConversationState::Speaking);
    assert_eq!(conversation.step(), ConversationState::Idle);
    assert_eq!(synth_calls.load(Ordering::SeqCst), 1);
    assert!(outcomes.lock().unwrap().is_empty());
    assert!(!gate.is_bound());
    assert!(!interrupt.is_raised());

    // Idle must wait for a fresh press
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        let _ = tx.send(conversation.step());
    });
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    interrupt.raise();
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        ConversationState::Listening
    );
    worker.join().unwrap();
}

#[test]
fn test_shutdown_flag_terminates_at_next_boundary() {
    let mut h = harness(Setup::default());

    start_turn(&mut h);
    h.shutdown.store(true, Ordering::SeqCst);
    assert_eq!(h.conversation.step(), ConversationState::Terminated);
    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_run_returns_after_exit_phrase() {
    let h = harness(Setup {
        heard: Ok("adiós".to_string()),
        ..Setup::default()
    });
    let Harness {
        mut conversation,
        interrupt,
        recorder,
        ..
    } = h;

    interrupt.raise();
    let worker = thread::spawn(move || conversation.run());
    assert_eq!(worker.join().unwrap(), ConversationState::Terminated);
    assert_eq!(
        recorder.states(),
        vec![
            ConversationState::Listening,
            ConversationState::Processing,
            ConversationState::Terminated,
        ]
    );
}
