use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use audio_studio_core::{
    decode, format_timestamp, FeatureExtractor, FrameRecorder, FrameSampler, ManualClock, ModeId,
    RecordingSettings, StudioConfig, StudioController, StudioError, StudioPhase,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> audio_studio_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Modes => {
            run_modes();
            Ok(())
        }
        Commands::Inspect { input, config } => run_inspect(&input, config.as_deref()),
        Commands::Render {
            input,
            mode,
            fps,
            seconds,
            looping,
            config,
            output,
        } => {
            let settings = RecordingSettings {
                output_path: output,
                fps,
            };
            run_render(&input, mode, seconds, looping, config.as_deref(), &settings)
        }
    }
}

fn run_modes() {
    for mode in ModeId::ALL {
        let descriptor = mode.descriptor();
        println!(
            "{:<10} {:<20} {}",
            mode, descriptor.name, descriptor.description
        );
    }
}

fn run_inspect(input: &Path, config: Option<&Path>) -> audio_studio_core::Result<()> {
    let config = load_config(config)?;
    let bytes = std::fs::read(input)?;
    let asset = decode(&bytes)?;
    tracing::info!(?input, "inspecting audio file");

    println!(
        "{}: {} Hz, {} channel(s), {} ({} frames)",
        input.display(),
        asset.sample_rate(),
        asset.channels(),
        format_timestamp(asset.duration_seconds()),
        asset.frame_count()
    );

    let sampler = FrameSampler::new(config.analysis.window_length, config.analysis.alignment)?;
    let mut extractor = FeatureExtractor::new(config.analysis.window_length);
    for fraction in [0.0, 0.25, 0.5, 0.75] {
        let position = asset.duration_seconds() * fraction;
        let features = extractor.analyze(&sampler.sample(&asset, position));
        let dominant = features
            .magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bucket, _)| bucket as f32 * features.bucket_hz())
            .unwrap_or(0.0);
        println!(
            "  {:>6}  peak {:.3}  rms {:.3}  centroid {:.3}  dominant {:.0} Hz",
            format_timestamp(position),
            features.peak,
            features.rms,
            features.spectral_centroid,
            dominant
        );
    }
    Ok(())
}

fn run_render(
    input: &Path,
    mode: Option<ModeId>,
    seconds: Option<f64>,
    looping: bool,
    config: Option<&Path>,
    settings: &RecordingSettings,
) -> audio_studio_core::Result<()> {
    let mut config = load_config(config)?;
    if let Some(mode) = mode {
        config.modes.initial = mode;
    }
    config.transport.looping = looping;
    let bytes = std::fs::read(input)?;

    let clock = ManualClock::new();
    let mut studio = StudioController::with_clock(config, Box::new(clock.clone()))?;
    let recorder = Arc::new(Mutex::new(FrameRecorder::create(settings)?));
    studio.subscribe(Box::new(Arc::clone(&recorder)));

    studio.load_asset(&bytes)?;
    let seconds = seconds.unwrap_or(studio.transport_state().duration).max(0.0);
    let ticks = (seconds * f64::from(settings.fps)).ceil() as u64;
    tracing::info!(?input, mode = %studio.mode(), ticks, "rendering frames");

    studio.play()?;
    let interval = settings.frame_interval();
    for _ in 0..ticks {
        clock.advance(interval);
        studio.tick();
        if studio.phase() != StudioPhase::Playing {
            break;
        }
    }

    let mut recorder = recorder
        .lock()
        .map_err(|_| StudioError::msg("frame recorder has been poisoned"))?;
    let written = recorder.finish()?;
    tracing::info!(
        written,
        errors = recorder.errors_seen(),
        output = ?settings.output_path,
        "render finished"
    );
    Ok(())
}

fn load_config(path: Option<&Path>) -> audio_studio_core::Result<StudioConfig> {
    match path {
        Some(path) => StudioConfig::load(path),
        None => Ok(StudioConfig::default()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive visualisation studio", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the available visualisation modes.
    Modes,
    /// Decode an audio file and print its format and a few feature readings.
    Inspect {
        /// Path to the audio file that should be analysed.
        input: PathBuf,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Play an audio file offline and record the render frames as JSON lines.
    Render {
        /// Path to the audio file that should be visualised.
        input: PathBuf,
        /// Visualisation mode (spectrum, particles or waveform).
        #[arg(short, long)]
        mode: Option<ModeId>,
        /// Ticks per second of playback.
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
        fps: u32,
        /// Seconds to render. Defaults to the whole file.
        #[arg(short, long)]
        seconds: Option<f64>,
        /// Loop playback instead of stopping at the end.
        #[arg(long = "loop")]
        looping: bool,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output path for the recorded frames.
        #[arg(short, long, default_value = "frames.jsonl")]
        output: PathBuf,
    },
}
