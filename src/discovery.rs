//! Serial device discovery
//!
//! Periodically enumerates the serial ports visible on the host and, while
//! no connection is live, asks the deck driver to connect to the first port
//! whose name matches the configured keyword. Every scan is also published
//! on a watch channel so a display surface can show the device list.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_serial::SerialPortType;
use tracing::{debug, info, warn};

use crate::deck::{DeckDriver, DeviceDescriptor};

/// Seam for serial port enumeration
///
/// Production uses [`SystemEnumerator`]; tests substitute fixed lists.
pub trait PortEnumerator: Send + Sync {
    fn list(&self) -> Result<Vec<DeviceDescriptor>>;
}

/// Enumerates the ports the OS currently exposes
pub struct SystemEnumerator;

impl PortEnumerator for SystemEnumerator {
    fn list(&self) -> Result<Vec<DeviceDescriptor>> {
        let ports =
            tokio_serial::available_ports().context("Failed to enumerate serial ports")?;
        Ok(ports.into_iter().map(to_descriptor).collect())
    }
}

fn to_descriptor(info: tokio_serial::SerialPortInfo) -> DeviceDescriptor {
    let name = match &info.port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .unwrap_or_else(|| info.port_name.clone()),
        _ => info.port_name.clone(),
    };
    DeviceDescriptor {
        path: info.port_name,
        name,
    }
}

/// First descriptor matching the keyword, in enumeration order
pub fn find_matching<'a>(
    devices: &'a [DeviceDescriptor],
    keyword: &str,
) -> Option<&'a DeviceDescriptor> {
    devices.iter().find(|d| d.matches(keyword))
}

/// Periodic discovery task
///
/// Runs until process shutdown. A slow cycle delays the next tick instead
/// of bursting, and an enumeration failure skips the cycle — there is no
/// faster retry than the configured interval.
pub struct DiscoveryPoller {
    enumerator: Arc<dyn PortEnumerator>,
    driver: Arc<DeckDriver>,
    match_keyword: String,
    interval: Duration,
    scan_tx: watch::Sender<Vec<DeviceDescriptor>>,
    /// Connect attempt spawned by an earlier cycle, if still in flight
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryPoller {
    pub fn new(
        enumerator: Arc<dyn PortEnumerator>,
        driver: Arc<DeckDriver>,
        match_keyword: String,
        interval: Duration,
    ) -> Self {
        let (scan_tx, _) = watch::channel(Vec::new());
        Self {
            enumerator,
            driver,
            match_keyword,
            interval,
            scan_tx,
            pending: Mutex::new(None),
        }
    }

    /// Watch channel carrying the most recent scan snapshot
    pub fn scan_rx(&self) -> watch::Receiver<Vec<DeviceDescriptor>> {
        self.scan_tx.subscribe()
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.scan_once();
        }
    }

    /// One discovery cycle
    ///
    /// Enumerates, publishes the snapshot, and — only when the link is idle
    /// — starts a connect to the first keyword match. While a connection is
    /// live or mid-open the scan is surfaced but triggers nothing. The
    /// connect runs on its own task so a slow open never holds up the next
    /// tick; at most one attempt is in flight at a time.
    pub fn scan_once(&self) {
        let devices = match self.enumerator.list() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("⚠️  Device enumeration failed: {:#}", e);
                return;
            }
        };
        debug!("Scan found {} port(s)", devices.len());
        self.scan_tx.send_replace(devices.clone());

        {
            let mut pending = self.pending.lock();
            if pending.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
                return;
            }
            *pending = None;
        }

        if !self.driver.state().is_idle() {
            return;
        }

        let descriptor = match find_matching(&devices, &self.match_keyword) {
            Some(descriptor) => descriptor.clone(),
            None => {
                debug!("No port matching '{}'", self.match_keyword);
                return;
            }
        };

        info!(
            "🔍 Found matching device: {} ({})",
            descriptor.path, descriptor.name
        );
        let driver = self.driver.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = driver.connect(descriptor.clone()).await {
                warn!("⚠️  Connect to {} failed: {}", descriptor.path, e);
            }
        });
        *self.pending.lock() = Some(handle);
    }
}

/// Print the enumerated serial ports, marking keyword matches
pub fn list_ports_formatted(match_keyword: &str) {
    use colored::*;

    println!("\n{}", "=== Available Serial Ports ===".bold().cyan());

    match SystemEnumerator.list() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("  {}", "No serial ports found".dimmed());
            } else {
                for device in &devices {
                    let marker = if device.matches(match_keyword) {
                        "[MATCH]".green()
                    } else {
                        "[     ]".dimmed()
                    };
                    println!("  {} {}  ({})", marker, device.path, device.name);
                }
            }
            println!("\nMatch keyword: {}", match_keyword.bright_white());
        }
        Err(e) => {
            println!("  {}", format!("Enumeration failed: {:#}", e).red());
        }
    }
}
