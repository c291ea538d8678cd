//! MediaDeck GW
//!
//! Gateway to drive host media and volume controls from a serial-connected
//! controller deck.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod deck;
mod discovery;
mod drivers;
mod protocol;
mod router;

use crate::config::AppConfig;
use crate::deck::{DeckDriver, DeckEvent};
use crate::discovery::{DiscoveryPoller, SystemEnumerator};
use crate::drivers::{ActionSink, ConsoleSink, MediaKeySink};
use crate::router::Router;

/// MediaDeck Gateway - drive host media and volume keys from a serial deck
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available serial ports
    #[arg(long)]
    list_ports: bool,

    /// Feed protocol lines from an interactive prompt instead of a device
    #[arg(long)]
    simulate: bool,

    /// Log actions instead of injecting keys
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level)?;

    info!("Starting MediaDeck GW...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load(&args.config).await?;

    // Handle list ports
    if args.list_ports {
        discovery::list_ports_formatted(&config.serial.match_keyword);
        return Ok(());
    }

    // Handle simulator mode
    if args.simulate {
        return run_simulator(config).await;
    }

    let sink: Arc<dyn ActionSink> = if args.dry_run {
        info!("Dry run: actions will be logged, not injected");
        Arc::new(ConsoleSink::new("dry-run"))
    } else {
        Arc::new(MediaKeySink::new()?)
    };

    // Set up shutdown signal
    let shutdown_signal = shutdown_signal();

    run_app(config, sink, shutdown_signal).await?;

    info!("MediaDeck GW shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    sink: Arc<dyn ActionSink>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("Starting main application loop...");

    let router = Router::new(config.protocol.clone(), sink);

    let driver = Arc::new(DeckDriver::with_serial(config.serial.baud_rate));
    let mut deck_rx = driver
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("Deck event receiver already taken"))?;

    let poller = DiscoveryPoller::new(
        Arc::new(SystemEnumerator),
        driver.clone(),
        config.serial.match_keyword.clone(),
        Duration::from_millis(config.serial.poll_interval_ms),
    );
    let mut scan_rx = poller.scan_rx();
    let mut status_rx = driver.status_rx();
    tokio::spawn(poller.run());
    info!(
        "🔍 Discovery poller started (keyword '{}', every {} ms)",
        config.serial.match_keyword, config.serial.poll_interval_ms
    );

    // Main event loop
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Handle deck events, strictly in arrival order
            Some(event) = deck_rx.recv() => match event {
                DeckEvent::Line(line) => {
                    if let Some(action) = router.on_line(&line) {
                        debug!("Line '{}' → {}", line.trim(), action);
                    }
                }
                DeckEvent::Disconnected { path, .. } => {
                    info!("🔁 {} : waiting for next scan to reconnect", path);
                }
            },

            // Surface scan snapshots to any attached display
            changed = scan_rx.changed() => {
                if changed.is_ok() {
                    debug!("📋 {} serial port(s) visible", scan_rx.borrow().len());
                }
            }

            // Mirror link status for display surfaces
            changed = status_rx.changed() => {
                if changed.is_ok() {
                    debug!("Link status: {:?}", *status_rx.borrow());
                }
            }

            // Handle shutdown signal
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    driver.disconnect();

    Ok(())
}

/// Interactive stand-in for the deck: typed lines run through the exact
/// parse/dispatch path with a console sink
async fn run_simulator(config: AppConfig) -> Result<()> {
    use colored::*;
    use rustyline::DefaultEditor;

    let sink = Arc::new(ConsoleSink::new("simulate"));
    let router = Router::new(config.protocol.clone(), sink.clone());

    println!(
        "{}",
        "Simulator: type protocol lines ('exit' to quit)".bold()
    );
    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("deck> ");
        match readline {
            Ok(line) => {
                if line.trim() == "exit" || line.trim() == "quit" {
                    break;
                }
                match router.on_line(&line) {
                    Some(action) => println!("  → {}", action.to_string().green()),
                    None => println!(
                        "  {} (mode: {})",
                        "no action".dimmed(),
                        router.mode().label()
                    ),
                }
            }
            Err(_) => break,
        }
    }

    println!("{} action(s) dispatched", sink.sent_count());
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
