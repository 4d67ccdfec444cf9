//! Process lifecycle for `voxloop run`
//!
//! Startup order:
//! 1. Probe audio input and output (fatal on failure)
//! 2. Load the speech, language and synthesis backends
//! 3. Start the hotkey listener thread
//! 4. Start the push server (optional; a bind failure only warns)
//! 5. Run the conversation on a blocking thread until it terminates
//!
//! Ctrl-C and SIGTERM set the shutdown flag and raise the interrupt so an
//! in-progress recording or answer unwinds; the conversation then ends at
//! the next state boundary. Cleanup joins the hotkey thread and stops the
//! push server.

use crate::audio::cpal_capture::CpalDevice;
use crate::audio::playback::RodioPlayer;
use crate::audio::AudioCaptureService;
use crate::config::Config;
use crate::conversation::{Conversation, ConversationParts};
use crate::error::{AudioError, Result, VoxloopError};
use crate::hotkey::{self, HotkeyGate, HotkeyListener};
use crate::interrupt::InterruptSignal;
use crate::push::server::{self, PushHandle};
use crate::push::{ObserverRegistry, PushNotifier, StateNotifier};
use crate::query::{create_query, LanguageQuery};
use crate::speech::{create_synthesizer, Synthesizer};
use crate::text::ExitPhrases;
use crate::transcribe::{create_transcriber, Transcriber};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Backends that take noticeable time to load
struct Backends {
    transcriber: Box<dyn Transcriber>,
    query: Box<dyn LanguageQuery>,
    synthesizer: Box<dyn Synthesizer>,
}

pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config;

        // Audio path first: nothing works without it
        let input = CpalDevice::new(&config.audio);
        let input_name = input.probe()?;
        tracing::info!("Audio input: {}", input_name);

        let player = RodioPlayer::new(&config.audio);
        player
            .probe()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
        tracing::info!("Audio output: {}", config.audio.output_device);

        let backends = load_backends(&config, Handle::current()).await?;

        let interrupt = Arc::new(InterruptSignal::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let gate = HotkeyGate::new(interrupt.clone());
        let source = hotkey::create_source(&config.hotkey)?;
        let listener = HotkeyListener::spawn(source, gate.clone(), shutdown.clone());

        let registry = ObserverRegistry::new(config.push.queue_depth);
        let push = start_push(&config, registry.clone()).await;
        let notifier: Arc<dyn StateNotifier> =
            Arc::new(PushNotifier::new(registry, config.push.include_idle));

        let signal_task = tokio::spawn(wait_for_signal(shutdown.clone(), interrupt.clone()));

        let parts = ConversationParts {
            interrupt: interrupt.clone(),
            gate,
            capture: AudioCaptureService::new(Box::new(input), interrupt, &config.audio),
            transcriber: backends.transcriber,
            query: backends.query,
            synthesizer: backends.synthesizer,
            player: Box::new(player),
            notifier,
            exit_phrases: ExitPhrases::new(&config.conversation.exit_phrases),
            shutdown,
        };

        tracing::info!(
            "Ready. Press {} to ask a question.",
            config.hotkey.key.to_uppercase()
        );

        let outcome =
            tokio::task::spawn_blocking(move || Conversation::new(parts).run()).await;

        signal_task.abort();

        if tokio::task::spawn_blocking(move || listener.shutdown())
            .await
            .is_err()
        {
            tracing::warn!("Hotkey listener shutdown task failed");
        }
        if let Some(push) = push {
            push.shutdown().await;
        }

        outcome
            .map(|_| ())
            .map_err(|e| VoxloopError::Config(format!("Conversation task failed: {}", e)))
    }
}

async fn load_backends(config: &Config, runtime: Handle) -> Result<Backends> {
    let transcribe = config.transcribe.clone();
    let query = config.query.clone();
    let speech = config.speech.clone();

    tokio::task::spawn_blocking(move || -> Result<Backends> {
        Ok(Backends {
            transcriber: create_transcriber(&transcribe)?,
            query: create_query(&query, runtime.clone())?,
            synthesizer: create_synthesizer(&speech, runtime)?,
        })
    })
    .await
    .map_err(|e| VoxloopError::Config(format!("Backend initialization task failed: {}", e)))?
}

async fn start_push(config: &Config, registry: ObserverRegistry) -> Option<PushHandle> {
    if !config.push.enabled {
        tracing::info!("Push server disabled");
        return None;
    }
    match server::start(&config.push, registry).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("{}; continuing without observers", e);
            None
        }
    }
}

async fn wait_for_signal(shutdown: Arc<AtomicBool>, interrupt: Arc<InterruptSignal>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to set up SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received Ctrl+C, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C, shutting down...");
    }

    shutdown.store(true, Ordering::SeqCst);
    interrupt.raise();
}
