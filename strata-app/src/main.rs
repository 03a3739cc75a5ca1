//! Strata
//!
//! Trains a convolutional deep belief network on labeled point-cloud
//! segments, writes it, then trains and writes a linear classifier on the
//! features the network extracts.

mod cli;
mod error;
mod pipeline;

use clap::Parser;
use cli::Args;
use tracing::{error, info};

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);
    info!("Strata {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = pipeline::run(&args) {
        error!(kind = ?e.kind(), "{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
