use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rover_hw_runtime::config::{LOOP_HZ, RuntimeSettings};
use rover_hw_runtime::hardware::JointLimits;

/// Rover hardware runtime: joint commands in, motor duty cycles out
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Run without hardware, mirroring commands back as joint positions
    #[arg(long)]
    simulate: bool,

    /// JSON file with "lower" and "upper" joint limit arrays
    #[arg(long)]
    limits: Option<PathBuf>,

    /// Control loop rate
    #[arg(long, default_value_t = LOOP_HZ)]
    loop_hz: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init(); // installs the subscriber globally

    let cli = Cli::parse();

    let limits = match &cli.limits {
        Some(path) => match JointLimits::load(path) {
            Ok(limits) => {
                info!("Loaded joint limits from {}", path.display());
                limits
            }
            Err(e) => {
                eprintln!("Invalid joint limits in {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => JointLimits::unbounded(),
    };

    let settings = RuntimeSettings {
        simulate: cli.simulate,
        limits,
        loop_hz: cli.loop_hz,
    };

    if let Err(e) = rover_hw_runtime::runtime::run(settings).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
