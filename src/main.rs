// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/motiongate

//! MotionGate - Motion State Inference Engine
//!
//! Command line entry point. Wires the simulated sensor suite into the
//! motion engine, subscribes to movement transitions, and drives a demo
//! scenario through foreground and background power modes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use motiongate::{
    Config, EventBus, MotionEngine, Scenario, SensorSimulator, SensorSuite, VERSION,
};

/// MotionGate - Motion State Inference Engine
#[derive(Parser, Debug)]
#[command(name = "motiongate")]
#[command(author = "MotionGate Project")]
#[command(version = VERSION)]
#[command(about = "Debounced motion state inference from accelerometer, steps, and activity")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated sensors
    #[arg(long)]
    demo: bool,

    /// Run duration in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Cycle between foreground and background every N seconds (0 = stay foreground)
    #[arg(long, default_value = "0")]
    cycle_power: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("MotionGate v{} - Motion State Inference Engine", VERSION);

    // Load or create configuration
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    config.validate()?;

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args.duration, args.cycle_power))
}

/// Run the engine until the duration elapses or Ctrl+C arrives.
async fn run(config: Config, duration_secs: u64, cycle_power_secs: u64) -> Result<()> {
    let simulator = std::sync::Arc::new(SensorSimulator::new(Scenario::commute()));
    let suite = SensorSuite {
        accelerometer: Some(simulator.clone()),
        activity: Some(simulator.clone()),
        steps: Some(simulator.clone()),
        location_wake: Some(simulator.clone()),
    };

    let bus = std::sync::Arc::new(EventBus::new(config.scheduler.channel_capacity));
    let engine = MotionEngine::new(config, suite, bus);

    let mut movements = engine.subscribe_movement();
    let watcher = tokio::spawn(async move {
        while let Ok(change) = movements.recv().await {
            info!(
                "movement edge: is_moving={} label={} at={}",
                change.is_moving, change.state.label, change.at
            );
        }
    });

    engine.start().await?;

    info!("MotionGate running, press Ctrl+C to shut down");

    let deadline = if duration_secs > 0 {
        Some(tokio::time::Instant::now() + Duration::from_secs(duration_secs))
    } else {
        None
    };

    let mut cycle = if cycle_power_secs > 0 {
        Some(tokio::time::interval(Duration::from_secs(cycle_power_secs)))
    } else {
        None
    };
    if let Some(iv) = cycle.as_mut() {
        // First tick fires immediately, swallow it so the cycle starts later.
        iv.tick().await;
    }
    let mut background = false;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("Shutdown signal received");
                break;
            }
            _ = async {
                match deadline {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                info!("Run duration elapsed");
                break;
            }
            _ = async {
                match cycle.as_mut() {
                    Some(iv) => { iv.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                background = !background;
                if background {
                    engine.enter_background().await;
                } else {
                    engine.enter_foreground().await;
                }
            }
        }
    }

    engine.stop().await?;
    watcher.abort();

    let status = engine.status().await;
    info!(
        "final status: {}",
        serde_json::to_string(&status).unwrap_or_else(|_| "<unserializable>".to_string())
    );
    info!("final verdict: is_moving={}", engine.is_moving().await);

    info!("MotionGate shutdown complete");
    Ok(())
}
