//! livemux - record a synthetic test pattern and tone into a container.
//!
//! Feeds the session the same way an emulator would: one scanline at a time,
//! then a frame push, then the audio produced during that frame.
//!
//! Usage:
//!   livemux [OPTIONS] <OUTPUT>
//!
//! Examples:
//!   livemux out.flv                                  # 10 s of 320x240@25
//!   livemux --frames 50 --input-rate 48000 out.flv   # resample the tone
//!   RUST_LOG=livemux=trace livemux out.flv           # log every packet

use std::f32::consts::TAU;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use livemux::livemux_codec::{find_encoder_by_name, ChannelLayout};
use livemux::{ContainerFormat, SessionConfig, StreamSession};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Output file
    output: PathBuf,
    #[arg(long, default_value_t = 320)]
    width: u32,
    #[arg(long, default_value_t = 240)]
    height: u32,
    #[arg(long, default_value_t = 25)]
    fps: u32,
    /// Number of video frames to record
    #[arg(long, default_value_t = 250)]
    frames: u32,
    /// Sample rate the tone is generated at
    #[arg(long, default_value_t = 44100)]
    input_rate: u32,
    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    tone: f32,
    #[arg(long, default_value_t = 12)]
    gop: u32,
    /// Container format (defaults to the output extension)
    #[arg(long)]
    format: Option<String>,
    /// Video encoder name, e.g. `flashsv` or `libopenh264`
    #[arg(long)]
    video_encoder: Option<String>,
    /// Mono output
    #[arg(long)]
    mono: bool,
}

/// Moving colour bars.
fn fill_scanline(row: &mut [u8], y: u32, frame: u32, width: u32) {
    const BARS: [[u8; 3]; 8] = [
        [255, 255, 255],
        [255, 255, 0],
        [0, 255, 255],
        [0, 255, 0],
        [255, 0, 255],
        [255, 0, 0],
        [0, 0, 255],
        [0, 0, 0],
    ];
    for (x, pixel) in row.chunks_exact_mut(3).enumerate() {
        let shifted = (x as u32 + frame * 4) % width;
        let mut color = BARS[(shifted * 8 / width) as usize];
        if y % 32 == 0 {
            color = [128, 128, 128];
        }
        pixel.copy_from_slice(&color);
    }
}

struct Tone {
    phase: f32,
    step: f32,
}

impl Tone {
    fn new(frequency: f32, rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / rate as f32,
        }
    }

    /// Interleaved stereo S16 bytes for `samples` samples.
    fn render(&mut self, samples: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples * 4);
        for _ in 0..samples {
            let value = (self.phase.sin() * 0.25 * i16::MAX as f32) as i16;
            out.extend_from_slice(&value.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
            self.phase = (self.phase + self.step) % TAU;
        }
        out
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("livemux=info".parse()?)
                .add_directive("warn".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = SessionConfig::new(args.width, args.height, args.fps)
        .gop_size(args.gop)
        .input_sample_rate(args.input_rate);
    if args.mono {
        config = config.channel_layout(ChannelLayout::Mono);
    }
    if let Some(name) = &args.format {
        let format = ContainerFormat::from_name(name)
            .with_context(|| format!("unknown container format '{}'", name))?;
        config = config.format(format);
    }
    if let Some(name) = &args.video_encoder {
        let info = find_encoder_by_name(name)
            .with_context(|| format!("unknown encoder '{}'", name))?;
        config = config.video_codec(info.id);
    }

    let mut session = StreamSession::new();
    if let Err(e) = session.init(args.output.as_path(), config) {
        session.cleanup().ok();
        return Err(e).context("failed to open output");
    }
    tracing::info!("Recording {} frames to {}", args.frames, args.output.display());

    let mut row = vec![0u8; args.width as usize * 3];
    let mut tone = Tone::new(args.tone, args.input_rate);
    let rate = args.input_rate as u64;
    let fps = args.fps as u64;
    for frame in 0..args.frames {
        for y in 0..args.height {
            fill_scanline(&mut row, y, frame, args.width);
            session.push_video_scanline(y, &row)?;
        }
        session.push_video_frame()?;

        // Samples belonging to this frame, without drift over long runs.
        let n = frame as u64;
        let samples = ((n + 1) * rate / fps - n * rate / fps) as usize;
        session.push_audio_samples(samples, &tone.render(samples))?;
    }

    session.cleanup()?;
    tracing::info!(
        "Wrote {} frames and {} audio samples",
        session.frames(),
        session.audio_samples()
    );
    Ok(())
}
