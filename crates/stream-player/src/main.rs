//! Stream Player: plays local files as simultaneous streams through one
//! output device, driving a `stream-core` host on a fixed tick.
//!
//! Ctrl-C fades every stream out and exits once they are closed. A second
//! Ctrl-C exits at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stream_player::cli::{Args, Command};
use stream_player::config::{PlayRequest, PlayerConfig};
use stream_player::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,stream_player=info,stream_core=info,media_pipeline=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let config = PlayerConfig::from_args(&args)?;
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let _ = ctrlc::set_handler(move || {
            if shutdown.swap(true, Ordering::Relaxed) {
                std::process::exit(130);
            }
        });
    }

    match args.cmd {
        Some(Command::Play {
            paths,
            looping,
            volume,
            max_volume,
            fade_in,
            fade_out,
            json,
        }) => {
            let request = PlayRequest {
                paths,
                looping,
                volume,
                max_volume,
                fade_in,
                fade_out,
                json,
            };
            runtime::run_play(config, request, shutdown)
        }
        None => {
            anyhow::bail!("nothing to do: pass --list-devices or a `play` command");
        }
    }
}
