//! fluxgraph command line entry point.

use anyhow::Context;
use clap::{Parser, Subcommand};
use fluxgraph::broker::Broker;
use fluxgraph::config::EngineConfig;
use fluxgraph::engine::Engine;
use fluxgraph::logging;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fluxgraph")]
#[command(about = "Declarative dataflow engine with rate-clocked graphs and a pub/sub bridge")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the graphs described in one or more files
    Run {
        /// Graph description files (.yaml, .yml, .toml, .json)
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Engine configuration file
        #[arg(short = 'c', long = "config", value_name = "FILE")]
        config: Option<PathBuf>,

        /// Broker address, overriding the configuration
        #[arg(short = 'b', long = "broker", value_name = "HOST:PORT")]
        broker: Option<String>,

        /// Stop after this many seconds
        #[arg(short = 'd', long = "duration", value_name = "SECONDS", value_parser = parse_duration)]
        duration: Option<Duration>,
    },

    /// Run a standalone broker
    Broker {
        /// Address to listen on, overriding the configuration
        #[arg(long = "bind", value_name = "HOST:PORT")]
        bind: Option<String>,

        /// Engine configuration file
        #[arg(short = 'c', long = "config", value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("duration must be a non-negative number of seconds, got {s}"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("duration {s} is out of range: {e}"))
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig, ExitCode> {
    EngineConfig::load_or_default(path.map(PathBuf::as_path)).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(e.exit_code() as u8)
    })
}

fn stop_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::AcqRel) {
            // Second interrupt: give up on a clean shutdown
            std::process::exit(130);
        }
        eprintln!("\nShutting down...");
    })
    .context("failed to install interrupt handler")?;
    Ok(stop)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            files,
            config,
            broker,
            duration,
        } => {
            let mut config = match load_config(config.as_ref()) {
                Ok(config) => config,
                Err(code) => return code,
            };
            if let Some(address) = broker {
                config.broker.address = address;
            }
            let _guard = match logging::init(&config.logging) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::from(e.exit_code() as u8);
                }
            };
            run(config, &files, duration)
        }
        Commands::Broker { bind, config } => {
            let mut config = match load_config(config.as_ref()) {
                Ok(config) => config,
                Err(code) => return code,
            };
            if let Some(address) = bind {
                config.broker.address = address;
            }
            let _guard = match logging::init(&config.logging) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::from(e.exit_code() as u8);
                }
            };
            match serve_broker(&config.broker.address) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!("{e:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(config: EngineConfig, files: &[PathBuf], duration: Option<Duration>) -> ExitCode {
    let stop = match stop_flag() {
        Ok(stop) => stop,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(files = files.len(), broker = %config.broker.address, "Starting fluxgraph");
    let engine = Engine::new(config);
    match engine.run(files, duration, &stop) {
        Ok(report) => {
            tracing::info!(
                graphs = report.graphs.len(),
                invalid = report.failures.len(),
                "fluxgraph stopped"
            );
            ExitCode::from(report.exit_code() as u8)
        }
        Err(e) => {
            tracing::error!(error = %e, "Engine failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn serve_broker(address: &str) -> anyhow::Result<()> {
    let stop = stop_flag()?;
    let broker = Broker::bind(address).with_context(|| format!("failed to bind broker on {address}"))?;
    tracing::info!(address = %broker.local_addr(), "Broker running, press Ctrl+C to stop");

    while !stop.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(100));
    }
    broker.shutdown();
    Ok(())
}
