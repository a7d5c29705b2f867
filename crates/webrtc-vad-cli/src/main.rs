//! Example host: per-frame decisions for a raw PCM capture.
//!
//! Reads a headerless 16-bit little-endian mono file, runs the detector
//! frame by frame, prints the decision string and a merged segment
//! table.
//!
//! ```text
//! webrtc-vad-cli --mode 3 --rate 16000 --frame-ms 30 capture.raw
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use webrtc_vad::{valid_rate_and_frame_length, VadMode};
use webrtc_vad_stream::StreamVad;

#[derive(Parser)]
#[command(about = "Voice activity decisions for raw 16-bit mono PCM")]
struct Args {
    /// Aggressiveness mode, 0 (quality) through 3 (very aggressive).
    #[arg(long, default_value = "0")]
    mode: i32,

    /// Sample rate of the input file in Hz.
    #[arg(long, default_value = "16000")]
    rate: i32,

    /// Frame duration in milliseconds (10, 20 or 30).
    #[arg(long, default_value = "30")]
    frame_ms: u32,

    /// Raw PCM file, headerless, 16-bit little-endian mono.
    file: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();

    let mode = match VadMode::try_from(args.mode) {
        Ok(mode) => mode,
        Err(err) => {
            eprintln!("invalid --mode {}: {err}", args.mode);
            return ExitCode::FAILURE;
        }
    };

    let samples_per_frame = args.rate as usize / 1000 * args.frame_ms as usize;
    if !valid_rate_and_frame_length(args.rate, samples_per_frame) {
        eprintln!(
            "unsupported rate/frame combination: {} Hz, {} ms",
            args.rate, args.frame_ms
        );
        return ExitCode::FAILURE;
    }

    let data = match std::fs::read(&args.file) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("cannot read {}: {err}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    let mut stream = match StreamVad::new(mode, args.rate, args.frame_ms) {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("cannot configure detector: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = stream.write(&data) {
        eprintln!("processing failed: {err}");
        return ExitCode::FAILURE;
    }
    if stream.buffered_bytes() > 0 {
        tracing::warn!(
            bytes = stream.buffered_bytes(),
            "trailing bytes short of a frame were ignored"
        );
    }

    let frame_bytes = samples_per_frame * 2;
    let frames = data.len() / frame_bytes;

    let mut pattern = String::with_capacity(frames);
    for segment in stream.segments() {
        let count = ((segment.end - segment.start).as_millis() / args.frame_ms as u128) as usize;
        let c = if segment.is_speech { '1' } else { '0' };
        pattern.extend(std::iter::repeat(c).take(count));
    }
    println!("{pattern}");

    println!();
    println!("{:>12}  {:>12}  decision", "start", "end");
    for segment in stream.segments() {
        println!(
            "{:>10.3}s  {:>10.3}s  {}",
            segment.start.as_secs_f64(),
            segment.end.as_secs_f64(),
            if segment.is_speech { "speech" } else { "silence" }
        );
    }

    ExitCode::SUCCESS
}
