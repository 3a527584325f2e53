use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stream-player", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// TOML config file with [host] and [pipeline] tables
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Host tick interval in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long)]
    pub chunk_frames: Option<usize>,

    /// Playback callback refill cap (frames). Larger reduces lock churn but can add latency.
    #[arg(long)]
    pub refill_max_frames: Option<usize>,

    /// Queue buffer target in seconds
    #[arg(long)]
    pub buffer_seconds: Option<f32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play one or more local files as simultaneous streams
    Play {
        /// Paths or file:// URIs
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Restart each stream when it reaches the end
        #[arg(long = "loop")]
        looping: bool,

        /// Stream volume in percent
        #[arg(long, default_value_t = 100.0)]
        volume: f32,

        /// Volume ceiling in percent
        #[arg(long, default_value_t = 100.0)]
        max_volume: f32,

        /// Fade in from silence over this many seconds
        #[arg(long, default_value_t = 0.0)]
        fade_in: f32,

        /// Fade out over this many seconds before the end and on Ctrl-C
        #[arg(long, default_value_t = 1.0)]
        fade_out: f32,

        /// Print stream status as JSON lines instead of log records
        #[arg(long)]
        json: bool,
    },
}
