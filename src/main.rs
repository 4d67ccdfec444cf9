//! Voxloop - one-key voice assistant
//!
//! Run with `voxloop` or `voxloop run` to start the conversation loop.
//! Use `voxloop config --init` to write a starter config file.
//! Use `voxloop transcribe <file>` or `voxloop ask <question>` to test a
//! single backend without the microphone.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use tracing_subscriber::EnvFilter;
use voxloop::audio::{cpal_capture, CaptureBuffer};
use voxloop::config::{self, Config};
use voxloop::daemon::Daemon;
use voxloop::query::create_query;
use voxloop::transcribe::create_transcriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("voxloop={},warn", log_level))),
        )
        .with_target(false)
        .init();

    let command = cli.command.unwrap_or(Commands::Run);

    // `config --init` must work even when the existing file does not parse
    if let Commands::Config { init: true } = command {
        return init_config(cli.config.as_deref());
    }

    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(hotkey) = cli.hotkey {
        config.hotkey.key = hotkey;
    }
    if let Some(model) = cli.model {
        config.transcribe.model = model;
    }
    if let Some(bind) = cli.bind {
        config.push.bind = bind;
    }
    if cli.no_push {
        config.push.enabled = false;
    }

    match command {
        Commands::Run => {
            Daemon::new(config).run().await?;
        }

        Commands::Config { .. } => {
            show_config(&config)?;
        }

        Commands::Devices => {
            list_devices()?;
        }

        Commands::Transcribe { file } => {
            transcribe_file(&config, &file)?;
        }

        Commands::Ask { question } => {
            ask(config, question).await?;
        }
    }

    Ok(())
}

fn init_config(path: Option<&Path>) -> anyhow::Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::default_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };

    if config::write_default_config(&path)? {
        println!("Wrote default config to {:?}", path);
    } else {
        println!("Config already exists at {:?}, left untouched", path);
    }
    Ok(())
}

/// Print the effective configuration as TOML
fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("# Effective configuration\n");
    println!("{}", toml::to_string_pretty(config)?);

    println!("# ---");
    match Config::default_path() {
        Some(path) if path.exists() => println!("# Config file: {:?}", path),
        Some(path) => println!("# Config file: {:?} (not found, using defaults)", path),
        None => println!("# Config file: (no config directory)"),
    }
    println!("# Models dir: {:?}", Config::models_dir());
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let devices = cpal_capture::list_input_devices()?;
    if devices.is_empty() {
        println!("No audio input devices found");
        return Ok(());
    }

    println!("Audio input devices:\n");
    for name in devices {
        println!("  {}", name);
    }
    println!("\nSet [audio] device = \"<name>\" to pick one (substring match works).");
    Ok(())
}

/// Transcribe a WAV file with the configured backend
fn transcribe_file(config: &Config, path: &Path) -> anyhow::Result<()> {
    use hound::WavReader;

    println!("Loading audio file: {:?}", path);

    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    println!(
        "Audio format: {} Hz, {} channel(s), {:?}",
        spec.sample_rate, spec.channels, spec.sample_format
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max_val)
                .collect()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .filter_map(|s| s.ok())
            .collect(),
    };

    let mono: Vec<f32> = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect()
    } else {
        samples
    };

    // Backends resample to what they need
    let buffer = CaptureBuffer::new(mono, spec.sample_rate);
    println!(
        "Processing {} samples ({:.2}s)...",
        buffer.len(),
        buffer.duration().as_secs_f32()
    );

    let transcriber = create_transcriber(&config.transcribe)?;
    let text = transcriber.transcribe(&buffer)?;

    println!("\n{}", text.trim());
    Ok(())
}

/// Send a typed question through the same prompt and cleanup as the loop
async fn ask(config: Config, question: String) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Handle::current();
    let answer = tokio::task::spawn_blocking(move || {
        let query = create_query(&config.query, runtime)?;
        query.query(&question)
    })
    .await??;

    println!("{}", answer);
    Ok(())
}
