use anyhow::{Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait};
use hearken::audio::{MicCapture, read_wav_samples};
use hearken::pipeline::{ModelPaths, WakePipeline};
use hearken::{ClosureSink, Config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "hearken", version, about = "Always-on wake word detection")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Listen for wake words on the microphone (or a WAV file)
    Listen {
        /// Directory holding the ONNX models
        #[arg(short, long, default_value = "models")]
        model_dir: PathBuf,

        /// Configuration file (defaults to the XDG path)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Feed a WAV file instead of the microphone
        #[arg(long)]
        wav: Option<PathBuf>,

        /// Override the wake threshold
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// List available audio input devices
    Devices,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Listen {
            model_dir,
            config,
            wav,
            threshold,
        }) => listen(model_dir, config, wav, threshold),
        Some(Commands::Devices) => list_devices(),
        None => {
            println!("hearken - always-on wake word detection");
            println!("Run with --help for usage");
            Ok(())
        }
    }
}

fn listen(
    model_dir: PathBuf,
    config_path: Option<PathBuf>,
    wav: Option<PathBuf>,
    threshold: Option<f32>,
) -> Result<()> {
    let config_path = config_path.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?
        .with_env_overrides();
    if let Some(threshold) = threshold {
        config.wake.threshold = threshold;
    }
    config.validate()?;

    let paths = ModelPaths::from_dir(&model_dir)
        .with_context(|| format!("resolving models in {}", model_dir.display()))?;
    println!(
        "Models: {} wake word(s), VAD {}",
        paths.wake_words.len(),
        if paths.vad.is_some() { "on" } else { "off" }
    );

    let mut pipeline = WakePipeline::new(config);
    pipeline.init(&paths).context("loading models")?;

    let sink = Arc::new(ClosureSink::new(
        |name| println!(">>> wake word: {} <<<", name),
        |name, pcm, sample_rate| {
            println!(
                "captured {:.2}s of audio after '{}'",
                pcm.len() as f32 / sample_rate as f32,
                name
            );
        },
    ));
    pipeline.start(sink).context("starting pipeline")?;

    match wav {
        Some(path) => {
            let samples = read_wav_samples(&path)?;
            println!("Feeding {} ({} samples)...", path.display(), samples.len());
            for chunk in samples.chunks(1280) {
                pipeline.feed(chunk);
            }
            // Let the workers drain before stopping.
            std::thread::sleep(Duration::from_secs(2));
        }
        None => {
            let mic = MicCapture::new().context("opening microphone")?;
            println!("Listening... (Ctrl+C to quit)");
            loop {
                match mic.try_read() {
                    Some(chunk) => pipeline.feed(&chunk),
                    None => std::thread::sleep(Duration::from_millis(10)),
                }
            }
        }
    }

    pipeline.stop();
    Ok(())
}

fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("enumerating input devices")?;

    let mut found = false;
    for device in devices {
        if let Ok(name) = device.name() {
            println!("{}", name);
            found = true;
        }
    }
    if !found {
        println!("no input devices found");
    }
    Ok(())
}
