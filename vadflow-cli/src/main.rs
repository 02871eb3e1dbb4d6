//! `vadflow`: replay a WAV file through one VAD stream.
//!
//! Events are printed to stdout as JSON lines; logs go to stderr
//! (`RUST_LOG`, default `vadflow=info`).
//!
//! ```text
//! vadflow clip.wav [--options opts.json] [--frame-ms 20] [--realtime]
//!                  [--boundaries-only] [--model energy|silero] [--model-path p]
//! ```

mod settings;
mod wav;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use vadflow_core::{
    AudioFrame, EnergyModel, ModelFactory, StreamStatus, Vad, VadEvent, VadOptions, VadStream,
};

#[cfg(feature = "onnx")]
use vadflow_core::SileroModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelKind {
    Energy,
    #[cfg(feature = "onnx")]
    Silero,
}

#[derive(Debug)]
struct Args {
    input: PathBuf,
    options: Option<PathBuf>,
    save_options: Option<PathBuf>,
    frame_ms: u32,
    realtime: bool,
    boundaries_only: bool,
    model: ModelKind,
    model_path: Option<PathBuf>,
}

const USAGE: &str = "Usage: vadflow <input.wav> [--options <file.json>] [--save-options <file.json>] \\
  [--frame-ms <n>] [--realtime] [--boundaries-only] [--model energy|silero] [--model-path <file.onnx>]";

fn parse_args() -> Result<Args> {
    let mut input: Option<PathBuf> = None;
    let mut options: Option<PathBuf> = None;
    let mut save_options: Option<PathBuf> = None;
    let mut frame_ms: u32 = 20;
    let mut realtime = false;
    let mut boundaries_only = false;
    let mut model = ModelKind::Energy;
    let mut model_path: Option<PathBuf> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--options" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --options");
                };
                options = Some(PathBuf::from(v));
            }
            "--save-options" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --save-options");
                };
                save_options = Some(PathBuf::from(v));
            }
            "--frame-ms" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --frame-ms");
                };
                frame_ms = v
                    .parse::<u32>()
                    .context("invalid value for --frame-ms")?
                    .clamp(1, 1000);
            }
            "--realtime" => realtime = true,
            "--boundaries-only" => boundaries_only = true,
            "--model" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --model");
                };
                model = match v.as_str() {
                    "energy" => ModelKind::Energy,
                    #[cfg(feature = "onnx")]
                    "silero" => ModelKind::Silero,
                    other => bail!("unknown model '{other}'"),
                };
            }
            "--model-path" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --model-path");
                };
                model_path = Some(PathBuf::from(v));
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown argument: {other}"),
            other => {
                if input.replace(PathBuf::from(other)).is_some() {
                    bail!("only one input file is supported");
                }
            }
        }
    }

    let Some(input) = input else {
        bail!("missing input file\n{USAGE}");
    };
    Ok(Args {
        input,
        options,
        save_options,
        frame_ms,
        realtime,
        boundaries_only,
        model,
        model_path,
    })
}

fn model_factory(args: &Args, options: &VadOptions) -> Result<ModelFactory> {
    let rate = options.model_sample_rate;
    match args.model {
        ModelKind::Energy => {
            if args.model_path.is_some() {
                warn!("--model-path is ignored for the energy model");
            }
            // 32 ms windows, the size Silero uses at 16 kHz.
            let window = (rate as usize * 32 / 1000).max(1);
            Ok(ModelFactory::new(move || Ok(EnergyModel::new(window, rate))))
        }
        #[cfg(feature = "onnx")]
        ModelKind::Silero => {
            let path = args
                .model_path
                .clone()
                .unwrap_or_else(SileroModel::default_model_path);
            if !path.exists() {
                bail!("Silero model not found at {}", path.display());
            }
            Ok(ModelFactory::new(move || SileroModel::new(&path, rate)))
        }
    }
}

fn print_event(out: &mut impl Write, event: &VadEvent, boundaries_only: bool) -> Result<()> {
    if boundaries_only && !event.is_boundary() {
        return Ok(());
    }
    serde_json::to_writer(&mut *out, event).context("serializing event")?;
    writeln!(out).context("writing event")?;
    Ok(())
}

fn frames(audio: &wav::WavAudio, frame_ms: u32) -> impl Iterator<Item = AudioFrame> + '_ {
    let frame_len = (audio.sample_rate as usize * frame_ms as usize / 1000).max(1);
    audio
        .samples
        .chunks(frame_len)
        .map(|chunk| AudioFrame::new(chunk.to_vec(), audio.sample_rate))
}

/// Push every frame at once, then print what comes out.
async fn replay_batch(stream: &mut VadStream, audio: &wav::WavAudio, args: &Args) -> Result<()> {
    for frame in frames(audio, args.frame_ms) {
        stream.push_frame(frame)?;
    }
    stream.end_input();

    let mut out = std::io::stdout().lock();
    while let Some(event) = stream.recv_event().await {
        print_event(&mut out, &event, args.boundaries_only)?;
    }
    Ok(())
}

/// Push one frame per `frame_ms`, printing events as they arrive.
async fn replay_realtime(
    stream: &mut VadStream,
    audio: &wav::WavAudio,
    args: &Args,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(args.frame_ms as u64));
    let mut out = std::io::stdout().lock();

    for frame in frames(audio, args.frame_ms) {
        ticker.tick().await;
        stream.push_frame(frame)?;
        while let Some(event) = stream.try_recv_event() {
            print_event(&mut out, &event, args.boundaries_only)?;
        }
        out.flush().context("flushing stdout")?;
    }
    stream.end_input();

    while let Some(event) = stream.recv_event().await {
        print_event(&mut out, &event, args.boundaries_only)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vadflow=info")),
        )
        .init();

    let args = parse_args()?;
    let options = settings::load_options(args.options.as_deref())?;
    if let Some(path) = &args.save_options {
        settings::save_options(path, &options)
            .with_context(|| format!("saving options to {}", path.display()))?;
        info!(path = %path.display(), "options saved");
    }

    let audio = wav::read_wav(&args.input)?;
    info!(
        file = %args.input.display(),
        sample_rate = audio.sample_rate,
        channels = audio.channels,
        duration_secs = audio.duration_secs(),
        "input loaded"
    );

    let vad = Vad::new(options.clone(), model_factory(&args, &options)?)
        .context("creating VAD")?;
    let mut stream = vad.stream().context("opening stream")?;

    if args.realtime {
        replay_realtime(&mut stream, &audio, &args).await?;
    } else {
        replay_batch(&mut stream, &audio, &args).await?;
    }

    let status = stream.status();
    let summary = stream.join().await.context("stream failed")?;
    info!(
        ?status,
        processed_secs = summary.processed_secs,
        events = summary.events,
        segments = summary.diagnostics.segments_started,
        "replay finished"
    );
    if status != StreamStatus::Closed {
        warn!(?status, "stream did not close cleanly");
    }
    Ok(())
}
