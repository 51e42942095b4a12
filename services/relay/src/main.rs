//! Radar beam relay.
//!
//! Reads NEXRAD Level II data from a file feed, a TCP stream or a tape
//! device, reformats each radial into a beam, and publishes the beam stream
//! to an output queue with a one-beam lag so tilt and volume boundaries are
//! flagged on the closing beam.

mod config;
mod driver;
mod reformat;
mod sink;
#[cfg(test)]
mod testdata;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use level2_wire::Compression;
use pipeline::{OutputMux, ShiftRegister};

use config::{InputConfig, RelayConfig};
use reformat::Level2Reformatter;
use sink::JsonLinesQueue;

#[derive(Parser, Debug)]
#[command(name = "radar-relay")]
#[command(about = "NEXRAD Level II ingest and beam relay")]
struct Args {
    /// Configuration file path (also read from RADAR_RELAY_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Archive input files; overrides the configured input when given
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Treat archive input files as bzip2 block streams
    #[arg(long)]
    bzip2: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr: stdout may be the beam sink.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting radar relay");

    let mut config = RelayConfig::load(args.config.as_deref())?;
    if !args.files.is_empty() {
        config.input = InputConfig::Archive {
            files: args.files.clone(),
            compression: if args.bzip2 {
                Compression::Bzip2
            } else {
                Compression::Uncompressed
            },
            one_file_per_volume: true,
        };
    }

    let mut transport = driver::build_transport(&config.input)?;
    let mut queue = JsonLinesQueue::create(&config.queue)?;
    let mut reformatter = Level2Reformatter::new();
    let mut register = ShiftRegister::new();
    let mut mux = OutputMux::new(config.output.clone());

    match driver::run(
        transport.as_mut(),
        &mut reformatter,
        &mut register,
        &mut mux,
        &mut queue,
    ) {
        Ok(()) => {
            info!("Relay finished");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Pipeline failed");
            std::process::exit(1);
        }
    }
}
